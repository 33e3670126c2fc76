pub(crate) mod broadcast;
pub(crate) mod communicator;
pub(crate) mod local;

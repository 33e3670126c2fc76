pub(crate) mod fused;

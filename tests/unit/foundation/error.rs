use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        SortLastError::config("x")
            .to_string()
            .contains("configuration error:")
    );
    assert!(
        SortLastError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        SortLastError::transport("x")
            .to_string()
            .contains("transport error:")
    );
    assert!(
        SortLastError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = SortLastError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

use subtle::ConstantTimeEq;

/// Compare a submitted secret against the configured one in constant time.
/// With no secret configured every submission is refused.
pub fn is_valid_order_password(expected: Option<&str>, provided: &str) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    // ct_eq on slices of unequal length is already false; the length itself is
    // not treated as secret.
    expected.len() == provided.len() && bool::from(expected.ct_eq(provided))
}

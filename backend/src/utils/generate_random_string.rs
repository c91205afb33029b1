use rand::{Rng, RngCore, distributions::Alphanumeric};

/// Generates a random alphanumeric string of the specified length.
///
/// The generated string contains uppercase letters (A-Z), lowercase letters (a-z),
/// and digits (0-9). Used for token identifiers and placeholder secrets.
///
/// # Arguments
///
/// * `length` - The desired length of the generated string
pub fn generate_random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generates `byte_len` random bytes from the thread-local CSPRNG and
/// returns them hex-encoded (so the string is `2 * byte_len` long).
pub fn generate_random_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

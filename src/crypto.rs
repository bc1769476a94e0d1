//! Smart Home payload obfuscation.
//! An autokey XOR chain seeded with a fixed initial key. It provides wire
//! compatibility only and offers no confidentiality.

/// Seed of the XOR chain.
pub const INITIAL_KEY: u8 = 0xAB;

/// Obfuscate a plaintext payload.
///
/// Every output byte is the XOR of the input byte with the previous output
/// byte, starting from [`INITIAL_KEY`].
pub fn encrypt(data: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    data.iter()
        .map(|&b| {
            key ^= b;
            key
        })
        .collect()
}

/// Reverse [`encrypt`].
///
/// The chain must be walked in order: each plaintext byte depends on the
/// preceding obfuscated byte.
pub fn decrypt(data: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    data.iter()
        .map(|&b| {
            let plain = key ^ b;
            key = b;
            plain
        })
        .collect()
}

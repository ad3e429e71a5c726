/// Additive payload checksum: wrapping u32 sum of every byte
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Validate payload checksum
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    checksum(data) == expected
}

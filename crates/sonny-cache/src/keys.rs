use sha2::{Digest, Sha256};

/// Derive the Redis database index for a cloud name: `sha256(cloud)` read
/// as a 256-bit big-endian integer, `mod 15`, `+1`. Index `0` is reserved
/// for the cross-cloud namespace and is never returned here.
pub fn db_index(cloud: &str) -> u8 {
    let digest = Sha256::digest(cloud.as_bytes());
    // Only the trailing bytes matter for a modulus this small; take the
    // digest as one big unsigned integer via successive remainders so we
    // don't need a bignum type.
    let mut rem: u32 = 0;
    for byte in digest {
        rem = (rem * 256 + byte as u32) % 15;
    }
    (rem as u8) + 1
}

pub const KEY_HYPERVISORS: &str = "hypervisors";
pub const KEY_AGENTS: &str = "agents";
pub const KEY_SERVERS: &str = "servers";
pub const KEY_SERVICES: &str = "services";
pub const KEY_AGGREGATES: &str = "aggregates";
pub const KEY_PROJECTS: &str = "projects";
pub const KEY_API_ALIVE: &str = "api_alive";
pub const KEY_RESURRECTION_TIMESTAMP: &str = "resurrection:timestamp";

pub fn timestamp_key(key: &str) -> String {
    format!("{key}:timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_index_is_in_1_to_15() {
        for cloud in ["prod", "staging", "dev", "", "a-very-long-cloud-name"] {
            let idx = db_index(cloud);
            assert!((1..=15).contains(&idx), "{cloud} -> {idx}");
        }
    }

    #[test]
    fn db_index_is_deterministic() {
        assert_eq!(db_index("mycloud"), db_index("mycloud"));
    }

    #[test]
    fn timestamp_key_appends_suffix() {
        assert_eq!(timestamp_key("hypervisors"), "hypervisors:timestamp");
    }
}

use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use uuid::Uuid;

/// Adjectives for generated slugs
const ADJECTIVES: [&str; 22] = [
    "amber", "bold", "brisk", "calm", "clever", "crisp", "eager", "fuzzy", "gentle", "happy",
    "jolly", "keen", "lively", "mellow", "nimble", "proud", "quiet", "rapid", "shiny", "sunny",
    "swift", "witty",
];

/// Nouns for generated slugs
const NOUNS: [&str; 22] = [
    "badger", "beacon", "breeze", "canyon", "comet", "falcon", "garden", "harbor", "island",
    "lantern", "maple", "meadow", "otter", "pebble", "pine", "raven", "river", "sparrow",
    "summit", "tiger", "valley", "willow",
];

/// Generate a random URL-safe slug
/// Format: `<adjective>-<noun>-<0..999>`, e.g. "brisk-otter-42"
pub fn generate_slug() -> String {
    let mut rng = thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let number: u16 = rng.gen_range(0..1000);
    format!("{}-{}-{}", adjective, noun, number)
}

/// Generate a tunnel identifier
/// Format: 12 lowercase alphanumeric characters
pub fn generate_tunnel_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(|c| c.to_ascii_lowercase())
        .map(char::from)
        .collect()
}

/// Generate a unique request identifier using UUID v4
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slug_shape() {
        for _ in 0..100 {
            let slug = generate_slug();
            let parts: Vec<&str> = slug.split('-').collect();
            assert_eq!(parts.len(), 3, "unexpected slug: {}", slug);
            assert!(parts[0].chars().all(|c| c.is_ascii_lowercase()));
            assert!(parts[1].chars().all(|c| c.is_ascii_lowercase()));
            let n: u16 = parts[2].parse().unwrap();
            assert!(n < 1000);
        }
    }

    #[test]
    fn test_slug_space_is_large() {
        // ~484k combinations means 200 draws rarely collide but may;
        // just check the generator is not obviously degenerate
        let slugs: HashSet<String> = (0..200).map(|_| generate_slug()).collect();
        assert!(slugs.len() > 150);
    }

    #[test]
    fn test_tunnel_id_format() {
        let id = generate_tunnel_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!id.chars().any(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_request_id_is_uuid_v4() {
        let id = generate_request_id();
        let uuid = Uuid::parse_str(&id).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }

    #[test]
    fn test_request_id_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(generate_request_id()), "duplicate request ID");
        }
    }
}

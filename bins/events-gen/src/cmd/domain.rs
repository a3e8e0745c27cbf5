use serde_json::json;

use event_api::{ClientError, Event, now_iso};

/// Upper bound (exclusive) of `payload.randomValue`.
pub const RANDOM_VALUE_LIMIT: u64 = 10_000;

/// One synthetic event: fresh UUID, current timestamp, random payload.
pub fn build_event(event_type: &str, rng: &mut Rng) -> Result<Event, ClientError> {
    Event::new(
        uuid::Uuid::new_v4().to_string(),
        event_type,
        now_iso(),
        json!({ "randomValue": rng.next_below(RANDOM_VALUE_LIMIT) }),
    )
}

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

pub struct Rng {
    state: u64,
}

impl Rng {
    /// `None` or `Some(0)` seeds from the clock.
    pub fn new(seed: Option<u64>) -> Self {
        let state = match seed {
            Some(s) if s != 0 => s,
            _ => {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos() as u64
                    | 1
            }
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform-ish value in `0..n`.
    pub fn next_below(&mut self, n: u64) -> u64 {
        self.next_u64() % n.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = Rng::new(Some(42));
        let mut b = Rng::new(Some(42));
        for _ in 0..100 {
            assert_eq!(a.next_below(RANDOM_VALUE_LIMIT), b.next_below(RANDOM_VALUE_LIMIT));
        }
    }

    #[test]
    fn built_event_decodes() {
        let mut rng = Rng::new(Some(7));
        let event = build_event("user_signup", &mut rng).unwrap();

        let decoded = Event::decode(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.event_type().as_deref(), Some("user_signup"));
        assert!(uuid::Uuid::parse_str(&decoded.event_id().unwrap()).is_ok());
        assert!(decoded.timestamp().is_some_and(|ts| ts.ends_with('Z')));

        let payload: serde_json::Value = serde_json::from_str(decoded.payload().unwrap().get()).unwrap();
        let value = payload["randomValue"].as_u64().unwrap();
        assert!(value < RANDOM_VALUE_LIMIT);
    }
}

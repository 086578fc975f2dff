/// Side channel payload used by the simulator when no other payload is given.
pub const DEMO_SIDE_PAYLOAD: &[u8] = b"XzBmIi18F8Ep1bzO5XDyDcfgQ87q36q4yOcO5BPtNyVLOqhFGua7wbHcA6LD7LTHfINWFhzlVSY8DVnxCvmLQIW09soYGHFvON78gD5gcqVv8UQw06teqQhLMxHA1LPeGwHFUJD9XGVJ47SUIqih8W7sODUbgpkPfwbaEmhkTBLfXvSFDuR22Hm7jGId7h3fXO8IIhl1gSmahuBzCACJ0avFUAsDupEqp7RiFumTdpjuFPoQ";

/// Repeats the payload until it is `length` bytes long. An empty payload gives zeros.
pub fn cycle_payload(payload: &[u8], length: usize) -> Vec<u8> {
    if payload.is_empty() {
        return vec![0u8; length];
    }
    payload.iter().copied().cycle().take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_payload_fills_largest_side_frame() {
        assert_eq!(DEMO_SIDE_PAYLOAD.len(), 240);
        assert_eq!(&cycle_payload(DEMO_SIDE_PAYLOAD, 159)[..], &DEMO_SIDE_PAYLOAD[..159]);
    }

    #[test]
    fn test_cycle() {
        assert_eq!(cycle_payload(b"abc", 7), b"abcabca".to_vec());
        assert_eq!(cycle_payload(&[], 3), vec![0, 0, 0]);
    }
}

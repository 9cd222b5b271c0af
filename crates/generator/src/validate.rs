//! Validation bounds for generator definitions, spec §4.7.

use crate::error::Error;

pub const MIN_PACKET_LENGTH: u32 = 14;
pub const MAX_PACKET_LENGTH: u32 = 9216;

/// Flow count ceiling without a signature attached; callers supply the
/// deployment's configured `api_flow_limit`.
pub const SIGNATURE_FLOW_LIMIT: u64 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Frames(u64),
    Time(u64),
    Continuous,
}

impl DurationUnit {
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Continuous => Ok(()),
            Self::Frames(frames) if *frames > 0 => Ok(()),
            Self::Time(time) if *time > 0 => Ok(()),
            _ => Err(Error::InvalidDuration),
        }
    }
}

pub fn validate_length(length: u32) -> Result<(), Error> {
    if (MIN_PACKET_LENGTH..=MAX_PACKET_LENGTH).contains(&length) {
        Ok(())
    } else {
        Err(Error::InvalidLength(length))
    }
}

pub fn validate_weight(weight: Option<u32>) -> Result<(), Error> {
    match weight {
        Some(0) => Err(Error::ZeroWeight),
        Some(_) | None => Ok(()),
    }
}

pub fn validate_load_rate(rate: f64) -> Result<(), Error> {
    if rate > 0.0 { Ok(()) } else { Err(Error::InvalidLoadRate) }
}

/// Validates an expanded flow count against the limit in effect: the
/// tighter `api_flow_limit` with no signature attached, or the looser
/// `SIGNATURE_FLOW_LIMIT` when every flow carries a signature trailer.
pub fn validate_flow_count(count: u64, api_flow_limit: u64, has_signature: bool) -> Result<(), Error> {
    let limit = if has_signature { SIGNATURE_FLOW_LIMIT } else { api_flow_limit };
    if count <= limit {
        Ok(())
    } else {
        Err(Error::FlowCountExceeded { count, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_just_outside_the_bounds_is_rejected() {
        assert!(validate_length(13).is_err());
        assert!(validate_length(9217).is_err());
        assert!(validate_length(14).is_ok());
        assert!(validate_length(9216).is_ok());
    }

    #[test]
    fn signature_flows_get_the_wider_limit() {
        assert!(validate_flow_count(70_000, 1000, true).is_ok());
        assert!(validate_flow_count(70_000, 1000, false).is_err());
    }

    #[test]
    fn zero_weight_is_rejected_but_unset_weight_is_fine() {
        assert!(validate_weight(None).is_ok());
        assert!(validate_weight(Some(0)).is_err());
        assert!(validate_weight(Some(1)).is_ok());
    }
}

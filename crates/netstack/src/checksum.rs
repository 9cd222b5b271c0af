//! Checksum-offload wiring (spec §4.5 item 3): per-interface masks
//! indicating which checksums the NIC verifies on RX and emits on TX.
//! The stack's own verify/generate masks are the bitwise complement.

use bitflags::bitflags;

bitflags! {
    /// Which checksums a NIC offloads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChecksumMask: u8 {
        const IPV4 = 0b0001;
        const TCP  = 0b0010;
        const UDP  = 0b0100;
        const ICMP = 0b1000;
    }
}

/// Derives the stack's per-interface verify (RX) and generate (TX)
/// masks from the NIC's offload mask: whatever the NIC already
/// verifies or generates, the stack does not need to do again.
pub fn stack_masks(offload: ChecksumMask) -> (ChecksumMask, ChecksumMask) {
    let complement = offload.complement();
    (complement, complement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_masks_are_the_bitwise_complement_of_offload() {
        let offload = ChecksumMask::IPV4 | ChecksumMask::TCP;
        let (verify, generate) = stack_masks(offload);

        assert!(!verify.contains(ChecksumMask::IPV4));
        assert!(!verify.contains(ChecksumMask::TCP));
        assert!(verify.contains(ChecksumMask::UDP));
        assert!(verify.contains(ChecksumMask::ICMP));
        assert_eq!(verify, generate);
    }
}

//! The traffic source object (spec §3, "Traffic source"): an expanded
//! [`crate::template::PacketTemplate`] sequence bound to a target port,
//! a load descriptor, and per-flow signature scratch, exposed to the
//! TX scheduler through [`fib::TxSource`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use fib::{PortId, TxSource};

use crate::signature::GeneratorSignature;

/// One flow's worth of counters and signature scratch, indexed by the
/// template's flow index (distinct from the frame index: several
/// rendered frames can share a flow when the template ties more
/// protocol fields than the signature's stream id covers).
#[derive(Default)]
struct FlowScratch {
    sequence_number: AtomicU32,
}

/// `fixed`: the same burst size and rate forever. `list`/`sequence`
/// length policies are resolved at expansion time in
/// [`crate::template::PacketTemplate`]; what's left for the load
/// descriptor is purely the transmit-side pacing.
#[derive(Debug, Clone, Copy)]
pub struct LoadDescriptor {
    pub burst_size: usize,
    pub packet_rate: u64,
}

/// How long a source keeps producing frames once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxLimit {
    Continuous,
    Frames(u64),
}

pub struct Counters {
    pub tx_frames: AtomicU64,
    pub tx_bytes: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            tx_frames: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
        }
    }
}

/// A ready-to-schedule traffic source: pre-expanded frames (one entry
/// per flow, already carrying a destination MAC patched in by ARP/ND
/// learning or left zeroed on timeout), a load descriptor, an optional
/// tx-limit, and the rolling index of the next frame to hand out.
pub struct TrafficSource {
    pub id: u32,
    pub target_port: PortId,
    frames: Vec<Vec<u8>>,
    signature_offsets: Vec<Option<usize>>,
    stream_id: u32,
    load: LoadDescriptor,
    limit: TxLimit,
    next_index: AtomicU64,
    active: AtomicBool,
    counters: Counters,
    flow_scratch: Vec<FlowScratch>,
}

impl TrafficSource {
    /// `signature_offsets[i]` is the byte offset of frame `i`'s 20-byte
    /// signature trailer, if the template attaches one.
    pub fn new(
        id: u32,
        target_port: PortId,
        frames: Vec<Vec<u8>>,
        signature_offsets: Vec<Option<usize>>,
        stream_id: u32,
        load: LoadDescriptor,
        limit: TxLimit,
    ) -> Self {
        let flow_scratch = frames.iter().map(|_| FlowScratch::default()).collect();
        Self {
            id,
            target_port,
            frames,
            signature_offsets,
            stream_id,
            load,
            limit,
            next_index: AtomicU64::new(0),
            active: AtomicBool::new(true),
            counters: Counters::default(),
            flow_scratch,
        }
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    pub fn counters(&self) -> (u64, u64) {
        (
            self.counters.tx_frames.load(Ordering::Relaxed),
            self.counters.tx_bytes.load(Ordering::Relaxed),
        )
    }

    fn patch_signature(&self, frame: &mut [u8], offset: usize, flow: usize) {
        let sequence_number = self.flow_scratch[flow].sequence_number.fetch_add(1, Ordering::Relaxed);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let signature = GeneratorSignature {
            stream_id: self.stream_id,
            sequence_number,
            timestamp,
            flags: 0,
        };

        let mut encoded = BytesMut::with_capacity(wire::signature::SIGNATURE_LEN);
        signature.to_trailer().encode(&mut encoded);

        if offset + encoded.len() <= frame.len() {
            frame[offset..offset + encoded.len()].copy_from_slice(&encoded);
        }
    }
}

impl TxSource for TrafficSource {
    fn active(&self) -> bool {
        if !self.active.load(Ordering::Relaxed) {
            return false;
        }
        match self.limit {
            TxLimit::Continuous => true,
            TxLimit::Frames(limit) => self.next_index.load(Ordering::Relaxed) < limit,
        }
    }

    fn burst_size(&self) -> usize {
        self.load.burst_size
    }

    fn packet_rate(&self) -> u64 {
        self.load.packet_rate
    }

    fn transform(&self, out: &mut Vec<Vec<u8>>) -> usize {
        if self.frames.is_empty() || !self.active() {
            return 0;
        }

        let mut produced = 0;
        for _ in 0..self.load.burst_size {
            if !self.active() {
                break;
            }

            let index = self.next_index.fetch_add(1, Ordering::Relaxed);
            let flow = (index % self.frames.len() as u64) as usize;
            let mut frame = self.frames[flow].clone();

            if let Some(offset) = self.signature_offsets[flow] {
                self.patch_signature(&mut frame, offset, flow);
            }

            self.counters.tx_frames.fetch_add(1, Ordering::Relaxed);
            self.counters.tx_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);

            out.push(frame);
            produced += 1;
        }

        produced
    }
}

/// Patches each frame's first six bytes (the Ethernet destination MAC)
/// in place from a resolved next-hop map, per §4.7: frames whose
/// next hop never resolved are left with whatever the caller seeded
/// (typically zero, on learning timeout).
pub fn patch_destination_macs(frames: &mut [Vec<u8>], macs: &[[u8; 6]]) {
    for (frame, mac) in frames.iter_mut().zip(macs.iter()) {
        if frame.len() >= 6 {
            frame[0..6].copy_from_slice(mac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(frames: Vec<Vec<u8>>, limit: TxLimit) -> TrafficSource {
        let signature_offsets = frames.iter().map(|_| None).collect();
        TrafficSource::new(1, 0, frames, signature_offsets, 7, LoadDescriptor { burst_size: 2, packet_rate: 1000 }, limit)
    }

    #[test]
    fn transform_cycles_through_flows_and_counts_bytes() {
        let source = source(vec![vec![0u8; 10], vec![0u8; 20]], TxLimit::Continuous);

        let mut out = Vec::new();
        assert_eq!(source.transform(&mut out), 2);
        assert_eq!(out.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 20]);

        let (frames, bytes) = source.counters();
        assert_eq!(frames, 2);
        assert_eq!(bytes, 30);
    }

    #[test]
    fn frame_limit_deactivates_the_source_once_reached() {
        let source = source(vec![vec![0u8; 10]], TxLimit::Frames(3));

        let mut out = Vec::new();
        assert_eq!(source.transform(&mut out), 2);
        assert!(source.active());

        out.clear();
        assert_eq!(source.transform(&mut out), 1);
        assert!(!source.active());
    }

    #[test]
    fn a_frame_with_a_signature_offset_carries_a_valid_trailer() {
        let mut frame = vec![0u8; 34];
        frame.extend(vec![0u8; 20]);
        let source = TrafficSource::new(
            1,
            0,
            vec![frame],
            vec![Some(34)],
            9,
            LoadDescriptor { burst_size: 1, packet_rate: 1 },
            TxLimit::Continuous,
        );

        let mut out = Vec::new();
        source.transform(&mut out);

        let trailer = wire::signature::Signature::decode(&mut &out[0][34..]).unwrap();
        let decoded = GeneratorSignature::from_trailer(&trailer);
        assert_eq!(decoded.stream_id, 9);
        assert_eq!(decoded.sequence_number, 0);
    }
}

//! Chunked JSON rendering of tier history
//!
//! A sample history reply can be far larger than the RAM we are willing to
//! spend on it, so it is never built in one piece. [`SampleStream`] keeps a
//! cursor into one tier and renders as many whole records as fit into each
//! buffer the transport offers, picking up exactly where the previous buffer
//! ended.
//!
//! Output for a PZEM-004T tier:
//!
//! ```text
//! [{"t":1615496537000,"U":229.50,"I":1.47,"P":1216,"W":5811338,"hz":50.0,"pF":0.64},...]
//! ```

use alloc::rc::Rc;
use core::fmt::Write;

use log::{debug, warn};

use crate::metrics::Metrics;
use crate::storage::{Cursor, SharedStorage};

/// Worst-case length of one rendered record with its separators.
///
/// Sized for the largest raw register values of any model and any `i32`
/// energy offset, plus a separator carried over from the previous chunk.
pub const RECORD_MAX_LEN: usize = 128;

/// Sent when the offered buffer can't hold a record; valid inside a JSON array
const FILLER: u8 = b' ';

/// Chunked serializer for the most recent samples of one tier
pub struct SampleStream<M> {
    ds: SharedStorage<M>,
    tsid: u8,
    epoch: u32,
    pos: Cursor,
    end: Cursor,
    opened: bool,
    closed: bool,
    /// The previous chunk ended on a record whose comma is still owed
    sep_pending: bool,
    sent: usize,
}

impl<M: Metrics> SampleStream<M> {
    /// Stream the last `count` samples of tier `tsid` (0 = all of them).
    ///
    /// Returns `None` if the tier does not exist or holds no samples.
    pub fn new(ds: SharedStorage<M>, tsid: u8, count: usize) -> Option<Self> {
        let (epoch, pos, end, size) = ds.lock(|cell| {
            let ds = cell.borrow();
            let tier = ds.store().tier(tsid)?;
            let size = tier.size();
            if size == 0 {
                return None;
            }

            let mut from = tier.cbegin();
            if count > 0 && count < size {
                // offset to the last `count` elements
                from = from.advance(size - count);
            }
            Some((ds.store().epoch(), from, tier.cend(), size))
        })?;

        debug!("TimeSeries buffer has {} items, scntr: {}", size, count);

        Some(Self {
            ds,
            tsid,
            epoch,
            pos,
            end,
            opened: false,
            closed: false,
            sep_pending: false,
            sent: 0,
        })
    }

    pub fn tier_id(&self) -> u8 {
        self.tsid
    }

    /// Records not yet emitted
    pub fn remaining(&self) -> usize {
        if self.closed {
            0
        } else {
            self.pos.distance_to(self.end)
        }
    }

    /// The closing bracket has been emitted
    pub fn is_finished(&self) -> bool {
        self.closed
    }

    /// Render the next chunk into `buf`, returning the number of bytes written.
    ///
    /// A return of 0 means the array is complete and the response can end.
    /// Buffers shorter than [`RECORD_MAX_LEN`] receive a single filler space.
    pub fn fill(&mut self, buf: &mut [u8]) -> usize {
        if self.closed || buf.is_empty() {
            return 0;
        }

        if buf.len() < RECORD_MAX_LEN {
            buf[0] = FILLER;
            return 1;
        }

        let mut len = 0;
        if !self.opened {
            buf[0] = b'[';
            len = 1;
            self.opened = true;
        }

        let ds = Rc::clone(&self.ds);
        ds.lock(|cell| {
            let ds = cell.borrow();
            let nrg_offset = ds.energy_offset();
            let tier = match ds.store().tier(self.tsid) {
                Some(tier) if ds.store().epoch() == self.epoch => tier,
                _ => {
                    warn!("Tier {} was reset while streaming", self.tsid);
                    self.close(buf, &mut len);
                    return;
                }
            };

            if self.pos < tier.cbegin() {
                warn!(
                    "Stream on tier {} overtaken by eviction, skipping {} samples",
                    self.tsid,
                    self.pos.distance_to(tier.cbegin())
                );
                self.pos = tier.cbegin();
            }

            loop {
                if self.pos >= self.end {
                    self.close(buf, &mut len);
                    break;
                }
                if buf.len() - len < RECORD_MAX_LEN {
                    self.hold_separator(buf, &mut len);
                    break;
                }

                // Never read behind the last valid element
                let Some(m) = tier.get(self.pos) else {
                    self.close(buf, &mut len);
                    break;
                };

                // Stamp against the head captured with the slice
                let tstamp = tier.timestamp_from(self.pos, self.end);
                match render_record(m, tstamp, nrg_offset) {
                    Ok(rec) => {
                        if self.sep_pending {
                            buf[len] = b',';
                            len += 1;
                            self.sep_pending = false;
                        }
                        buf[len..len + rec.len()].copy_from_slice(rec.as_bytes());
                        len += rec.len();
                        self.sent += 1;
                    }
                    Err(_) => warn!("Sample record overflow, skipped: {:?}", m),
                }
                self.pos = self.pos.advance(1);
            }
        });

        debug!(
            "Sending timeseries JSON, buffer {}/{}, items left: {}",
            len,
            buf.len(),
            self.remaining()
        );
        len
    }

    /// Keep the trailing comma of this chunk's last record back until the
    /// next record is actually written.
    fn hold_separator(&mut self, buf: &[u8], len: &mut usize) {
        if *len > 0 && buf[*len - 1] == b',' {
            *len -= 1;
            self.sep_pending = true;
        }
    }

    /// Terminate the array in the current buffer.
    ///
    /// The bracket replaces the trailing comma of the last record when that
    /// record is in this buffer. An owed comma from an earlier chunk is
    /// dropped, so the array never ends on a separator.
    fn close(&mut self, buf: &mut [u8], len: &mut usize) {
        if *len > 0 && buf[*len - 1] == b',' {
            buf[*len - 1] = b']';
        } else {
            buf[*len] = b']';
            *len += 1;
        }
        self.sep_pending = false;
        self.closed = true;
    }
}

/// Render one sample as a JSON object followed by a comma
pub fn render_record<M: Metrics>(
    m: &M,
    tstamp: u32,
    nrg_offset: i32,
) -> Result<heapless::String<RECORD_MAX_LEN>, core::fmt::Error> {
    let mut s = heapless::String::new();
    write!(s, "{{\"t\":{}", u64::from(tstamp) * 1000)?;
    for &q in M::QUANTITIES {
        if let Some(v) = m.calibrated(q, nrg_offset) {
            write!(s, ",\"{}\":{:.*}", q.json_key(), q.sample_precision(), v)?;
        }
    }
    s.push_str("},").map_err(|_| core::fmt::Error)?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use serde_json::Value;

    use crate::metrics::{Pz003Metrics, Pz004Metrics};
    use crate::storage::{DataStorage, TierSpec};

    const BASE_TS: u32 = 1_615_496_537;

    fn storage(capacity: usize, samples: u32) -> SharedStorage<Pz004Metrics> {
        let mut ds = DataStorage::default();
        ds.configure(&[
            TierSpec::new(1, capacity, 1, "Tier 1"),
            TierSpec::new(2, capacity, 15, "Tier 2"),
        ])
        .unwrap();
        ds.reset(BASE_TS).unwrap();
        for i in 0..samples {
            ds.push(sample(i), 0);
        }
        ds.into_shared()
    }

    fn sample(energy: u32) -> Pz004Metrics {
        Pz004Metrics::new(2295, 1470, 12160, energy, 500, 64)
    }

    fn drain(stream: &mut SampleStream<Pz004Metrics>, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        for _ in 0..10_000 {
            let n = stream.fill(&mut buf);
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
        panic!("stream did not terminate");
    }

    fn parse(out: &[u8]) -> Vec<Value> {
        match serde_json::from_slice::<Value>(out).unwrap() {
            Value::Array(items) => items,
            other => panic!("expected array, got {other}"),
        }
    }

    fn energies(items: &[Value]) -> Vec<u64> {
        items.iter().map(|v| v["W"].as_u64().unwrap()).collect()
    }

    #[test]
    fn test_unknown_or_empty_tier() {
        let ds = storage(5, 0);
        assert!(SampleStream::new(ds.clone(), 1, 0).is_none());
        assert!(SampleStream::new(ds, 99, 0).is_none());
    }

    #[test]
    fn test_all_samples_in_order() {
        let ds = storage(10, 7);
        let mut stream = SampleStream::new(ds, 1, 0).unwrap();
        let out = drain(&mut stream, 512);

        assert_eq!(out.first(), Some(&b'['));
        assert_eq!(out.last(), Some(&b']'));
        assert!(!out.windows(2).any(|w| w == b",]"));

        let items = parse(&out);
        assert_eq!(energies(&items), [0, 1, 2, 3, 4, 5, 6]);
        assert!(stream.is_finished());
        assert_eq!(stream.fill(&mut [0u8; 256]), 0);
    }

    #[test]
    fn test_last_n_samples() {
        let ds = storage(10, 7);
        let mut stream = SampleStream::new(ds.clone(), 1, 3).unwrap();
        assert_eq!(stream.remaining(), 3);
        assert_eq!(energies(&parse(&drain(&mut stream, 512))), [4, 5, 6]);

        let mut stream = SampleStream::new(ds, 1, 7).unwrap();
        assert_eq!(parse(&drain(&mut stream, 512)).len(), 7);
    }

    #[test]
    fn test_count_beyond_size_serves_all() {
        let ds = storage(10, 4);
        let mut stream = SampleStream::new(ds, 1, 50).unwrap();
        assert_eq!(energies(&parse(&drain(&mut stream, 512))), [0, 1, 2, 3]);
    }

    #[test]
    fn test_only_retained_samples_after_eviction() {
        let ds = storage(5, 12);
        let mut stream = SampleStream::new(ds, 1, 0).unwrap();
        assert_eq!(energies(&parse(&drain(&mut stream, 512))), [7, 8, 9, 10, 11]);
    }

    #[test]
    fn test_record_fields_and_timestamps() {
        let ds = storage(10, 3);
        let mut stream = SampleStream::new(ds.clone(), 2, 0).unwrap();
        let items = parse(&drain(&mut stream, 512));

        let ts: Vec<u64> = items.iter().map(|v| v["t"].as_u64().unwrap()).collect();
        let base = u64::from(BASE_TS) * 1000;
        assert_eq!(ts, [base - 30_000, base - 15_000, base]);

        let first = &items[0];
        assert_eq!(first["U"].as_f64().unwrap(), 229.5);
        assert_eq!(first["I"].as_f64().unwrap(), 1.47);
        assert_eq!(first["P"].as_u64().unwrap(), 1216);
        assert_eq!(first["hz"].as_f64().unwrap(), 50.0);
        assert_eq!(first["pF"].as_f64().unwrap(), 0.64);
    }

    #[test]
    fn test_exact_record_text() {
        let rec = render_record(&sample(5_811_338), BASE_TS, 0).unwrap();
        assert_eq!(
            rec.as_str(),
            "{\"t\":1615496537000,\"U\":229.50,\"I\":1.47,\"P\":1216,\"W\":5811338,\"hz\":50.0,\"pF\":0.64},"
        );

        let dc = render_record(&Pz003Metrics::new(23000, 100, 2300, 100), 0, 0).unwrap();
        assert_eq!(dc.as_str(), "{\"t\":0,\"U\":230.00,\"I\":1.00,\"P\":230,\"W\":100},");
    }

    #[test]
    fn test_large_energy_rendered_exactly() {
        let mut m = sample(4_000_000_001);
        let rec = render_record(&m, 0, 123).unwrap();
        assert!(rec.contains("\"W\":4000000124,"));

        m.energy = 16_777_217;
        let rec = render_record(&m, 0, 0).unwrap();
        assert!(rec.contains("\"W\":16777217,"));
    }

    #[test]
    fn test_worst_case_record_fits() {
        let m = Pz004Metrics {
            voltage: u16::MAX,
            current: u32::MAX,
            power: u32::MAX,
            energy: u32::MAX,
            freq: u16::MAX,
            pf: u16::MAX,
            alarm: u16::MAX,
        };
        // One byte left for a separator owed from the previous chunk
        for offset in [i32::MAX, i32::MIN] {
            let rec = render_record(&m, u32::MAX, offset).unwrap();
            assert!(rec.len() < RECORD_MAX_LEN);
        }
    }

    #[test]
    fn test_energy_offset_applied_at_read_time() {
        let mut ds = DataStorage::default();
        ds.configure(&[TierSpec::new(1, 5, 1, "Tier 1")]).unwrap();
        ds.reset(BASE_TS).unwrap();
        ds.set_energy_offset(500);
        ds.push(sample(1000), 0);
        let ds = ds.into_shared();

        let mut stream = SampleStream::new(ds.clone(), 1, 0).unwrap();
        let items = parse(&drain(&mut stream, 512));
        assert_eq!(energies(&items), [1500]);

        let stored = ds.lock(|c| c.borrow().store().tier(1).unwrap().last().copied());
        assert_eq!(stored.unwrap().energy, 1000);
    }

    #[test]
    fn test_small_buffer_gets_filler() {
        let ds = storage(10, 3);
        let mut stream = SampleStream::new(ds, 1, 0).unwrap();

        let mut small = [0u8; 16];
        assert_eq!(stream.fill(&mut small), 1);
        assert_eq!(small[0], b' ');
        assert_eq!(stream.remaining(), 3);
        assert!(!stream.is_finished());
    }

    #[test]
    fn test_chunking_does_not_change_content() {
        let ds = storage(50, 40);
        let mut reference = SampleStream::new(ds.clone(), 1, 0).unwrap();
        let expected = drain(&mut reference, 4096);

        let mut stream = SampleStream::new(ds, 1, 0).unwrap();
        let mut out = Vec::new();
        let sizes = [8usize, 130, 1, 300, 127, 129, 64, 200];
        let mut i = 0;
        loop {
            let mut buf = vec![0u8; sizes[i % sizes.len()]];
            let n = stream.fill(&mut buf);
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            i += 1;
            assert!(i < 10_000);
        }

        let stripped: Vec<u8> = out.into_iter().filter(|b| *b != b' ').collect();
        assert_eq!(stripped, expected);
        assert_eq!(parse(&stripped).len(), 40);
    }

    #[test]
    fn test_no_record_split_across_buffers() {
        let ds = storage(20, 20);
        let mut stream = SampleStream::new(ds, 1, 0).unwrap();
        let mut buf = vec![0u8; 200];
        loop {
            let n = stream.fill(&mut buf);
            if n == 0 {
                break;
            }
            let chunk = &buf[..n];
            // Every chunk ends on a record boundary, never on a separator
            let last = *chunk.last().unwrap();
            assert!(last == b'}' || last == b']' || last == b'[');
        }
    }

    #[test]
    fn test_push_during_stream() {
        let ds = storage(10, 3);
        let mut stream = SampleStream::new(ds.clone(), 1, 0).unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; RECORD_MAX_LEN + 1];

        let n = stream.fill(&mut buf);
        out.extend_from_slice(&buf[..n]);
        ds.lock(|c| c.borrow_mut().push(sample(100), 0));

        out.extend(drain(&mut stream, RECORD_MAX_LEN + 1));
        // The slice and its timestamps are fixed when the request arrives
        let items = parse(&out);
        assert_eq!(energies(&items), [0, 1, 2]);

        let ts: Vec<u64> = items.iter().map(|v| v["t"].as_u64().unwrap()).collect();
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
        let base = u64::from(BASE_TS) * 1000;
        assert_eq!(ts, [base - 2000, base - 1000, base]);
    }

    #[test]
    fn test_eviction_overtakes_stream() {
        let ds = storage(3, 3);
        let mut stream = SampleStream::new(ds.clone(), 1, 0).unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; RECORD_MAX_LEN + 1];

        let n = stream.fill(&mut buf);
        out.extend_from_slice(&buf[..n]);
        for i in 10..13 {
            ds.lock(|c| c.borrow_mut().push(sample(i), 0));
        }

        out.extend(drain(&mut stream, RECORD_MAX_LEN + 1));
        assert_eq!(out.last(), Some(&b']'));
        assert!(!out.windows(2).any(|w| w == b",]"));

        let items = parse(&out);
        assert_eq!(energies(&items), [0]);
    }

    #[test]
    fn test_purge_after_first_chunk() {
        let ds = storage(10, 5);
        let mut stream = SampleStream::new(ds.clone(), 1, 0).unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; RECORD_MAX_LEN + 1];

        let n = stream.fill(&mut buf);
        out.extend_from_slice(&buf[..n]);
        ds.lock(|c| c.borrow_mut().purge());

        out.extend(drain(&mut stream, 512));
        assert!(stream.is_finished());
        let items = parse(&out);
        assert_eq!(energies(&items), [0]);
        assert!(items.iter().all(Value::is_object));
    }

    #[test]
    fn test_purge_during_stream() {
        let ds = storage(10, 5);
        let mut stream = SampleStream::new(ds.clone(), 1, 0).unwrap();
        ds.lock(|c| c.borrow_mut().purge());

        let out = drain(&mut stream, 512);
        assert_eq!(out, b"[]");
    }

    #[test]
    fn test_reset_during_stream() {
        let ds = storage(10, 5);
        let mut stream = SampleStream::new(ds.clone(), 1, 0).unwrap();
        ds.lock(|c| {
            let mut ds = c.borrow_mut();
            ds.reset(BASE_TS + 60).unwrap();
            for i in 0..5 {
                ds.push(sample(100 + i), 0);
            }
        });

        let out = drain(&mut stream, 512);
        assert_eq!(out, b"[]");
    }
}

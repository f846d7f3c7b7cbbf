//! Request handlers for the web front-end
//!
//! The HTTP server itself is external. These handlers turn a request into a
//! [`Reply`] (small, fully rendered bodies) or a [`SampleStream`] that the
//! server drains chunk by chunk.

use alloc::string::String;
use core::fmt::Write;

use log::{debug, warn};

use crate::collector::{Clock, Espem};
use crate::metrics::{Metrics, Quantity};
use crate::producer::MeterProducer;
use crate::stream::SampleStream;

pub const MIME_JSON: &str = "application/json";
pub const MIME_TEXT: &str = "text/plain";

/// Header attached to sample streams so that external dashboards can fetch them
pub const CORS_HEADER: (&str, &str) = ("Access-Control-Allow-Origin", "*");

const MSG_COLLECTOR_DISABLED: &str = "Metrics collector disabled";
const MSG_DATA_READ_ERROR: &str = "Data read error";

/// HTTP status of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 200,
    Unavailable = 503,
}

impl Status {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// Fully rendered response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub mime: &'static str,
    pub body: String,
}

impl Reply {
    fn ok(mime: &'static str, body: String) -> Self {
        Self {
            status: Status::Ok,
            mime,
            body,
        }
    }

    fn unavailable(mime: &'static str, body: &str) -> Self {
        Self {
            status: Status::Unavailable,
            mime,
            body: String::from(body),
        }
    }
}

/// Parameters of a sample history request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplesQuery {
    /// Tier id
    pub tsid: u8,
    /// Number of most recent samples, 0 for all
    pub scnt: usize,
}

impl Default for SamplesQuery {
    fn default() -> Self {
        Self { tsid: 1, scnt: 0 }
    }
}

impl SamplesQuery {
    /// Parse a url query string like `tsid=2&scnt=10`.
    ///
    /// Missing or malformed parameters keep their defaults; unknown ones are
    /// ignored.
    pub fn from_query(query: &str) -> Self {
        let mut q = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "tsid" => q.tsid = value.parse().unwrap_or(q.tsid),
                "scnt" => q.scnt = value.parse().unwrap_or(q.scnt),
                _ => {}
            }
        }
        q
    }
}

/// Reply to a sample history request
pub enum SamplesReply<M> {
    /// Tier unknown or empty
    Unavailable(Reply),
    /// Chunked JSON array
    Stream(SampleStream<M>),
}

impl<M> SamplesReply<M> {
    pub fn status(&self) -> Status {
        match self {
            Self::Unavailable(r) => r.status,
            Self::Stream(_) => Status::Ok,
        }
    }

    pub fn mime(&self) -> &'static str {
        MIME_JSON
    }

    /// Extra response headers
    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Unavailable(_) => &[],
            Self::Stream(_) => &[CORS_HEADER],
        }
    }
}

impl<P: MeterProducer, C: Clock> Espem<P, C> {
    /// Serve the last `scnt` samples of tier `tsid` as a JSON array
    pub fn samples_reply(&self, query: SamplesQuery) -> SamplesReply<P::Metrics> {
        match SampleStream::new(self.storage().clone(), query.tsid, query.scnt) {
            Some(stream) => SamplesReply::Stream(stream),
            None => {
                debug!("No samples in tier {}", query.tsid);
                SamplesReply::Unavailable(Reply::unavailable(MIME_JSON, "[]"))
            }
        }
    }

    /// Latest reading as a JSON object
    pub fn data_reply(&self) -> Reply {
        let Some(pz) = self.meter() else {
            return Reply::unavailable(MIME_TEXT, MSG_COLLECTOR_DISABLED);
        };

        let mut body = String::new();
        let rendered = render_latest(&mut body, pz, self.energy_offset());
        if rendered.is_err() {
            warn!("Failed to render meter data");
            return Reply::unavailable(MIME_TEXT, MSG_DATA_READ_ERROR);
        }
        Reply::ok(MIME_JSON, body)
    }

    /// Latest reading in the plain `U:.. I:.. P:.. W:..` poller format
    pub fn pm_data_reply(&self) -> Reply {
        let has_data = self.tier_size(1).is_some_and(|n| n > 0);
        let Some(pz) = self.meter().filter(|_| has_data) else {
            return Reply::unavailable(MIME_TEXT, MSG_DATA_READ_ERROR);
        };

        let m = pz.metrics();
        let nrg_offset = self.energy_offset();
        let value = |q: Quantity| m.calibrated(q, nrg_offset).unwrap_or_default();

        let mut body = String::new();
        let rendered = write!(
            body,
            "U:{:.2} I:{:.2} P:{:.2} W:{:.2}",
            value(Quantity::Voltage),
            value(Quantity::Current),
            value(Quantity::Power),
            value(Quantity::Energy)
        );
        if rendered.is_err() {
            return Reply::unavailable(MIME_TEXT, MSG_DATA_READ_ERROR);
        }
        Reply::ok(MIME_TEXT, body)
    }
}

fn render_latest<P: MeterProducer>(out: &mut String, pz: &P, nrg_offset: i32) -> core::fmt::Result {
    let m = pz.metrics();
    write!(out, "{{\"stale\":{},\"age\":{}", pz.data_stale(), pz.data_age())?;
    for &q in <P::Metrics as Metrics>::QUANTITIES {
        if let Some(v) = m.calibrated(q, nrg_offset) {
            write!(out, ",\"{}\":{:.*}", q.json_key(), q.latest_precision(), v)?;
        }
    }
    out.write_char('}')
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use serde_json::Value;

    use crate::collector::CollectorState;
    use crate::metrics::Pz004Metrics;
    use crate::producer::{DummyMeter, DummyPort};
    use crate::storage::{DataStorage, TierSpec};

    type Meter = DummyMeter<Pz004Metrics>;
    type TestClock = fn() -> u32;

    const NOW: u32 = 1_700_000_000;

    fn clock() -> u32 {
        NOW
    }

    fn monitor() -> Espem<Meter, TestClock> {
        let mut ds = DataStorage::default();
        ds.configure(&[
            TierSpec::new(1, 10, 1, "Tier 1"),
            TierSpec::new(2, 10, 15, "Tier 2"),
        ])
        .unwrap();
        let mut espem = Espem::with_storage(ds, clock as TestClock);
        espem.begin(DummyPort { name: "uart1" }, || Meter::new(1));
        espem.set_collector_state(CollectorState::Running);
        espem
    }

    fn feed(espem: &mut Espem<Meter, TestClock>, energy: u32) {
        let m = Pz004Metrics::new(2295, 1470, 12160, energy, 500, 64);
        espem.meter_mut().unwrap().feed(m, NOW);
    }

    fn drain(reply: SamplesReply<Pz004Metrics>) -> Vec<u8> {
        let SamplesReply::Stream(mut stream) = reply else {
            panic!("expected a stream");
        };
        let mut out = Vec::new();
        let mut buf = vec![0u8; 1024];
        loop {
            let n = stream.fill(&mut buf);
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_query_parsing() {
        assert_eq!(SamplesQuery::from_query(""), SamplesQuery::default());
        assert_eq!(
            SamplesQuery::from_query("tsid=2&scnt=10"),
            SamplesQuery { tsid: 2, scnt: 10 }
        );
        assert_eq!(
            SamplesQuery::from_query("?scnt=5&foo=bar"),
            SamplesQuery { tsid: 1, scnt: 5 }
        );
        assert_eq!(
            SamplesQuery::from_query("tsid=abc&scnt=-3"),
            SamplesQuery::default()
        );
    }

    #[test]
    fn test_samples_from_unknown_tier() {
        let mut espem = monitor();
        feed(&mut espem, 1);

        let reply = espem.samples_reply(SamplesQuery { tsid: 99, scnt: 0 });
        assert_eq!(reply.status(), Status::Unavailable);
        assert!(reply.headers().is_empty());
        let SamplesReply::Unavailable(r) = reply else {
            panic!("expected unavailable");
        };
        assert_eq!(r.status.code(), 503);
        assert_eq!(r.mime, MIME_JSON);
        assert_eq!(r.body, "[]");
    }

    #[test]
    fn test_samples_from_empty_tier() {
        let espem = monitor();
        let reply = espem.samples_reply(SamplesQuery::default());
        assert_eq!(reply.status(), Status::Unavailable);
    }

    #[test]
    fn test_samples_stream() {
        let mut espem = monitor();
        for e in 0..5 {
            feed(&mut espem, e);
        }

        let reply = espem.samples_reply(SamplesQuery::from_query("tsid=1&scnt=2"));
        assert_eq!(reply.status(), Status::Ok);
        assert_eq!(reply.headers(), &[CORS_HEADER]);

        let items: Vec<Value> = serde_json::from_slice(&drain(reply)).unwrap();
        let energies: Vec<u64> = items.iter().map(|v| v["W"].as_u64().unwrap()).collect();
        assert_eq!(energies, [3, 4]);
    }

    #[test]
    fn test_data_reply() {
        let mut espem = monitor();
        espem.set_energy_offset(-100);
        feed(&mut espem, 1000);

        let reply = espem.data_reply();
        assert_eq!(reply.status, Status::Ok);
        assert_eq!(reply.mime, MIME_JSON);

        let v: Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(v["stale"], Value::Bool(false));
        assert_eq!(v["age"].as_u64(), Some(0));
        assert_eq!(v["U"].as_f64(), Some(229.5));
        assert_eq!(v["I"].as_f64(), Some(1.47));
        assert_eq!(v["P"].as_u64(), Some(1216));
        assert_eq!(v["W"].as_u64(), Some(900));
        assert_eq!(v["hz"].as_f64(), Some(50.0));
        assert_eq!(v["pF"].as_f64(), Some(0.64));
    }

    #[test]
    fn test_data_reply_without_meter() {
        let espem: Espem<Meter, TestClock> = Espem::new(clock as TestClock);
        let reply = espem.data_reply();
        assert_eq!(reply.status, Status::Unavailable);
        assert_eq!(reply.mime, MIME_TEXT);
        assert_eq!(reply.body, "Metrics collector disabled");
    }

    #[test]
    fn test_pm_data_reply() {
        let mut espem = monitor();
        assert_eq!(espem.pm_data_reply().body, "Data read error");

        espem.set_energy_offset(500);
        feed(&mut espem, 1000);

        let reply = espem.pm_data_reply();
        assert_eq!(reply.status, Status::Ok);
        assert_eq!(reply.mime, MIME_TEXT);
        assert_eq!(reply.body, "U:229.50 I:1.47 P:1216.00 W:1500.00");
    }
}

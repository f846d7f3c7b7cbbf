//! Desktop simulator for the espem energy monitor.
//!
//! Drives espem-core with a synthetic PZEM-004T meter so the collector, the
//! tiered history and the JSON replies can be watched without hardware.
//!
//! ```text
//! RUST_LOG=info cargo run -p espem-simulator -- 60
//! ```
//!
//! The optional argument is the run time in seconds (default 30).

use std::io::Write;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{info, warn};

use espem_core::config::EspemConfig;
use espem_core::producer::{DummyMeter, DummyPort};
use espem_core::publish::{FeedSink, PeriodicTrigger, Snapshot, UiUpdater};
use espem_core::reply::{SamplesQuery, SamplesReply};
use espem_core::storage::TierSpec;
use espem_core::{CollectorState, Espem, Pz004Metrics};

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

/// Meter poll period
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often tier 1 is dumped as a sample history reply
const DUMP_INTERVAL: Duration = Duration::from_secs(10);

/// Default run time when no argument is given
const DEFAULT_RUN_SECS: u64 = 30;

/// Chunk size offered to the stream, like a small TCP window
const CHUNK_LEN: usize = 256;

type Meter = DummyMeter<Pz004Metrics>;
type WallClock = fn() -> u32;

fn wall_clock() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}

// ---------------------------------------------------------------------------
// Host-side scheduler and feed
// ---------------------------------------------------------------------------

/// Repeating deadline driven by `std::time::Instant`
struct InstantTrigger {
    interval: embassy_time::Duration,
    next: Option<Instant>,
}

impl InstantTrigger {
    fn new() -> Self {
        Self {
            interval: embassy_time::Duration::from_secs(1),
            next: None,
        }
    }

    /// True once per interval while enabled
    fn due(&mut self) -> bool {
        match self.next {
            Some(at) if Instant::now() >= at => {
                self.restart_delayed();
                true
            }
            _ => false,
        }
    }
}

impl PeriodicTrigger for InstantTrigger {
    fn set_interval(&mut self, interval: embassy_time::Duration) {
        self.interval = interval;
    }

    fn interval(&self) -> embassy_time::Duration {
        self.interval
    }

    fn restart_delayed(&mut self) {
        self.next = Some(Instant::now() + Duration::from_millis(self.interval.as_millis()));
    }

    fn disable(&mut self) {
        self.next = None;
    }

    fn is_enabled(&self) -> bool {
        self.next.is_some()
    }
}

/// Feed that logs every snapshot
struct LogFeed;

impl FeedSink for LogFeed {
    fn available(&self) -> bool {
        true
    }

    fn send(&mut self, snapshot: &Snapshot) {
        info!("UI update: {:?}", snapshot);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Boot configuration as it would come back from flash
fn load_config() -> EspemConfig {
    let mut cfg = EspemConfig::default();
    // Short tiers so eviction is visible within a short run
    cfg.tiers.clear();
    for spec in [
        TierSpec::new(1, 20, 1, "Seconds"),
        TierSpec::new(2, 20, 5, "5 sec"),
        TierSpec::new(3, 20, 15, "15 sec"),
    ] {
        if cfg.tiers.push(spec).is_err() {
            warn!("Tier table full");
        }
    }
    cfg.energy_offset = 100;

    match cfg.to_vec().and_then(|blob| EspemConfig::from_bytes(&blob)) {
        Ok(restored) => restored,
        Err(e) => {
            warn!("Config blob unusable, using defaults: {}", e);
            EspemConfig::default()
        }
    }
}

/// Write the last few samples of tier 1 to stdout the way a web server would
fn dump_samples(espem: &Espem<Meter, WallClock>) {
    let query = SamplesQuery::from_query("tsid=1&scnt=5");
    let mut stream = match espem.samples_reply(query) {
        SamplesReply::Stream(stream) => stream,
        SamplesReply::Unavailable(reply) => {
            info!("Samples: {} {}", reply.status.code(), reply.body);
            return;
        }
    };

    let mut stdout = std::io::stdout().lock();
    let mut buf = [0u8; CHUNK_LEN];
    loop {
        let n = stream.fill(&mut buf);
        if n == 0 {
            break;
        }
        if let Err(e) = stdout.write_all(&buf[..n]) {
            warn!("stdout: {}", e);
            return;
        }
    }
    let _ = writeln!(stdout);
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let run_for = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .map_or(Duration::from_secs(DEFAULT_RUN_SECS), Duration::from_secs);
    info!("Starting espem simulator for {}s", run_for.as_secs());

    let cfg = load_config();
    let mut espem: Espem<Meter, WallClock> = Espem::new(wall_clock as WallClock);
    if let Err(e) = espem.apply_config(&cfg) {
        warn!("Tier layout rejected, keeping defaults: {}", e);
    }
    espem.begin(DummyPort { name: "uart-sim" }, || Meter::new(1));
    espem.meter_polling(cfg.poll);
    let state = espem.set_collector_state(cfg.collector);
    info!("Collector {:?}, energy offset {} Wh", state, espem.energy_offset());

    let mut ui = UiUpdater::new(InstantTrigger::new());
    ui.set_uirate(cfg.ui_rate);
    let mut feed = LogFeed;

    let started = Instant::now();
    let mut last_dump = Instant::now();

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    while started.elapsed() < run_for {
        let tick = Instant::now();

        // --- Meter poll ---------------------------------------------------
        if let Some(meter) = espem.meter_mut() {
            meter.poll(wall_clock());
        }

        // --- UI feed ------------------------------------------------------
        if ui.trigger_mut().due() {
            espem.publish(&mut feed);
        }

        // --- History dump -------------------------------------------------
        if last_dump.elapsed() >= DUMP_INTERVAL {
            info!(
                "Tier sizes: {:?} {:?} {:?}",
                espem.tier_size(1),
                espem.tier_size(2),
                espem.tier_size(3)
            );
            dump_samples(&espem);
            println!("{}", espem.data_reply().body);
            println!("{}", espem.pm_data_reply().body);
            last_dump = Instant::now();
        }

        let elapsed = tick.elapsed();
        if elapsed < POLL_INTERVAL {
            std::thread::sleep(POLL_INTERVAL - elapsed);
        }
    }

    espem.set_collector_state(CollectorState::Disabled);
    info!("Simulator exiting");
}

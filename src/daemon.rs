//! The single owning value that composes every component: built once
//! at startup in `main.rs`, driven by [`crate::eventloop::EventLoop`].

use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::capture::CaptureSource;
use crate::channel_power::ChannelPower;
use crate::config::Config;
use crate::gps::GpsSource;
use crate::logs::dump::BinaryDump;
use crate::logs::gpstrail::GpsTrailDump;
use crate::logs::snapshot::{CiscoSnapshot, CsvNetworkSnapshot, NetworkSnapshot, XmlNetworkSnapshot};
use crate::logs::weak::WeakDump;
use crate::logs::{expand_template, find_free_slot, Dump};
use crate::server::PushServer;
use crate::sound::SoundDispatcher;
use crate::tracker::Tracker;

pub struct Daemon {
    pub config: Config,
    pub tracker: Tracker,
    pub channel_power: ChannelPower,
    pub capture: Box<dyn CaptureSource>,
    pub gps: Box<dyn GpsSource>,
    pub server: PushServer,
    pub sound: SoundDispatcher,

    pub dump: Option<BinaryDump>,
    pub weak: Option<WeakDump>,
    pub network_snapshot: Option<NetworkSnapshot>,
    pub csv_snapshot: Option<CsvNetworkSnapshot>,
    pub xml_snapshot: Option<XmlNetworkSnapshot>,
    pub cisco_snapshot: Option<CiscoSnapshot>,
    pub gps_trail: Option<GpsTrailDump>,

    pub start_time: i64,
    pub local_drop_num: u64,
}

impl Daemon {
    pub fn build(
        config: Config,
        capture: Box<dyn CaptureSource>,
        gps: Box<dyn GpsSource>,
        start_time: i64,
    ) -> Result<Self> {
        let names: Vec<&str> = config.logtypes.iter().map(String::as_str).collect();
        let run = find_free_slot(&config.logtemplate, &config.logdefault, &names)
            .context("no free log file slot")?;

        let path_for = |name: &str| expand_template(&config.logtemplate, &config.logdefault, name, run);

        let mut tracker = Tracker::new();
        if let Some(path) = &config.ssidmap {
            tracker = tracker.with_ssid_map(path)?;
        }
        if let Some(path) = &config.ipmap {
            tracker = tracker.with_ip_map(path)?;
        }

        let mut dump = None;
        let mut weak = None;
        let mut network_snapshot = None;
        let mut csv_snapshot = None;
        let mut xml_snapshot = None;
        let mut cisco_snapshot = None;
        let mut gps_trail = None;

        for kind in &names {
            match *kind {
                "dump" => {
                    let mut d = BinaryDump::new(config.logtemplate.clone(), config.logdefault.clone(), config.dumplimit);
                    d.open(&path_for("dump"))?;
                    dump = Some(d);
                }
                "weak" => {
                    let mut w = WeakDump::new();
                    w.open(&path_for("weak"))?;
                    weak = Some(w);
                }
                "network" => network_snapshot = Some(NetworkSnapshot::new(path_for("network"))),
                "csv" => csv_snapshot = Some(CsvNetworkSnapshot::new(path_for("csv"))),
                "xml" => xml_snapshot = Some(XmlNetworkSnapshot::new(path_for("xml"))),
                "cisco" => cisco_snapshot = Some(CiscoSnapshot::new(path_for("cisco"))),
                "gps" => {
                    let mut g = GpsTrailDump::new();
                    g.open(&path_for("gps"))?;
                    gps_trail = Some(g);
                }
                other => anyhow::bail!("unknown log type {other:?}"),
            }
        }

        let addr: SocketAddr = format!("0.0.0.0:{}", config.tcpport)
            .parse()
            .context("building push server bind address")?;
        let server = PushServer::setup(addr, config.maxclients, &config.allowedhosts)?;

        let mut sound = SoundDispatcher::new(config.soundplay.clone(), config.festival.clone());
        if let Some(path) = &config.sound_new {
            sound.bind("new", path);
        }
        if let Some(path) = &config.sound_traffic {
            sound.bind("traffic", path);
        }
        if let Some(path) = &config.sound_junktraffic {
            sound.bind("junktraffic", path);
        }
        if let Some(path) = &config.sound_gpslock {
            sound.bind("gpslock", path);
        }
        if let Some(path) = &config.sound_gpslost {
            sound.bind("gpslost", path);
        }

        Ok(Self {
            config,
            tracker,
            channel_power: ChannelPower::new(),
            capture,
            gps,
            server,
            sound,
            dump,
            weak,
            network_snapshot,
            csv_snapshot,
            xml_snapshot,
            cisco_snapshot,
            gps_trail,
            start_time,
            local_drop_num: 0,
        })
    }

    /// Truncate-and-rewrite every snapshot writer from the tracker's
    /// current state. Called on the `datainterval` tick and once more
    /// during shutdown before the empty-file check.
    pub fn rewrite_snapshots(&mut self) -> Result<()> {
        let networks = self.tracker.fetch_networks();
        if let Some(s) = &self.network_snapshot {
            s.write(&networks)?;
        }
        if let Some(s) = &self.csv_snapshot {
            s.write(&networks)?;
        }
        if let Some(s) = &self.xml_snapshot {
            s.write(&networks)?;
        }
        if let Some(s) = &self.cisco_snapshot {
            s.write(&networks)?;
        }
        Ok(())
    }
}

//! Single-threaded reactor over the capture source, the push server's
//! listen socket, every connected client socket, and a 1-Hz wall-clock
//! tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use mio::{Events, Interest, Poll, Token};

use crate::capture::Fetch;
use crate::daemon::Daemon;
use crate::error::DaemonError;
use crate::gps::GpsFix;
use crate::logs::Dump;
use crate::server::protocol::{ClientOptions, Verb};
use crate::server::SERVER_TOKEN;

const CAPTURE_TOKEN: Token = Token(usize::MAX - 1);

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub struct EventLoop {
    daemon: Daemon,
    poll: Poll,
    events: Events,
    shutdown: Arc<AtomicBool>,
    last_tick: i64,
    last_write: i64,
    last_snapshot: i64,
    last_waypoint: i64,
    last_gps_mode: i32,
    last_packet_total: u64,
    last_traffic_sound: i64,
}

impl EventLoop {
    pub fn new(mut daemon: Daemon, shutdown: Arc<AtomicBool>) -> Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(daemon.server.listener_mut(), SERVER_TOKEN, Interest::READABLE)?;
        if let Some(mut fd) = daemon.capture.descriptor() {
            poll.registry().register(&mut fd, CAPTURE_TOKEN, Interest::READABLE)?;
        }
        let start = daemon.start_time;
        Ok(Self {
            daemon,
            poll,
            events: Events::with_capacity(256),
            shutdown,
            last_tick: start,
            last_write: start,
            last_snapshot: start,
            last_waypoint: start,
            last_gps_mode: 0,
            last_packet_total: 0,
            last_traffic_sound: start,
        })
    }

    pub fn daemon(&self) -> &Daemon {
        &self.daemon
    }

    pub fn daemon_mut(&mut self) -> &mut Daemon {
        &mut self.daemon
    }

    /// Unwrap the event loop back into its daemon once `run` returns,
    /// so the shutdown sequence can take ownership of it.
    pub fn into_daemon(self) -> Daemon {
        self.daemon
    }

    /// Run until the shutdown flag is set. The caller installs the
    /// signal handler that flips `shutdown` (see `shutdown.rs`).
    pub fn run(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            self.tick_once()?;
        }
        Ok(())
    }

    /// One reactor iteration: poll, dispatch readiness, and run the
    /// 1-Hz tick if the wall-clock second rolled over.
    pub fn tick_once(&mut self) -> Result<()> {
        self.poll.poll(&mut self.events, Some(Duration::from_secs(1)))?;

        let mut server_readable = false;
        let mut capture_readable = false;
        let mut client_tokens = Vec::new();
        for event in self.events.iter() {
            match event.token() {
                SERVER_TOKEN => server_readable = true,
                CAPTURE_TOKEN => capture_readable = true,
                t => client_tokens.push(t),
            }
        }

        for token in client_tokens {
            let verbs = self.daemon.server.handle_readable(token)?;
            for verb in verbs {
                match verb {
                    Verb::Pause => self.daemon.capture.pause(),
                    Verb::Resume => self.daemon.capture.resume(),
                    _ => {}
                }
            }
        }

        if server_readable {
            let accepted = self.daemon.server.accept_ready()?;
            for token in accepted {
                if let Some(stream) = self.daemon.server.client_stream_mut(token) {
                    self.poll.registry().register(stream, token, Interest::READABLE)?;
                }
                self.send_greeting(token);
            }
        }

        let polled_every_tick = self.daemon.capture.descriptor().is_none();
        if capture_readable || polled_every_tick {
            self.pump_capture()?;
        }

        let now = now();
        if now > self.last_tick {
            self.last_tick = now;
            self.run_wallclock_tick(now)?;
        }

        if self.daemon.config.writeinterval > 0
            && now - self.last_snapshot >= self.daemon.config.writeinterval
        {
            self.daemon.rewrite_snapshots()?;
            self.last_snapshot = now;
        }

        if self.daemon.config.waypoints && now - self.last_waypoint >= self.daemon.config.decay {
            if let Some(trail) = &mut self.daemon.gps_trail {
                trail.append_fix(now, self.daemon.gps.fetch_loc())?;
            }
            self.last_waypoint = now;
        }

        // Closed clients are dropped by `reap_closed` itself; the OS
        // closes their socket, which removes it from the epoll set
        // without an explicit deregister call.
        self.daemon.server.reap_closed();

        Ok(())
    }

    fn send_greeting(&mut self, token: Token) {
        let greeting = format!("*KISMET 1.0 {}\n", self.daemon.start_time);
        self.daemon.server.send(token, &greeting);
        for net in self.daemon.tracker.fetch_networks() {
            self.daemon
                .server
                .send(token, &format!("*NETWORK {}\n", crate::tracker::wire::net_to_string(net)));
            for cdp in net.cisco_equip.values() {
                self.daemon.server.send(
                    token,
                    &format!("*CISCO {} {}\n", net.bssid, crate::tracker::wire::cdp_to_string(cdp)),
                );
            }
        }
    }

    fn pump_capture(&mut self) -> Result<()> {
        loop {
            match self.daemon.capture.fetch_packet() {
                Ok(Fetch::Packet(info)) => self.handle_packet(info)?,
                Ok(Fetch::Idle) | Ok(Fetch::Eof) => break,
                Err(e) => {
                    let err = DaemonError::CaptureFatal(e.to_string());
                    self.daemon.server.send_to_all(&format!("*STATUS {err}\n"));
                    self.daemon.server.flush_writes()?;
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    fn handle_packet(&mut self, info: crate::packet::PacketInfo) -> Result<()> {
        if let Some(filter) = self.daemon.config.macfilter {
            if info.source_mac == filter {
                self.daemon.local_drop_num += 1;
                return Ok(());
            }
        }

        self.daemon.channel_power.observe(info.channel, info.time, info.signal);
        let status = self.daemon.tracker.process_packet(&info);

        if let Some(status) = &status {
            self.daemon.server.send_to_all(&format!("*STATUS {status}\n"));
            self.daemon.sound.play("new");
            self.daemon.sound.say(status);
        }

        let skip_dump = (matches!(info.kind, crate::packet::FrameKind::Noise) && !self.daemon.config.noiselog)
            || (matches!(info.kind, crate::packet::FrameKind::Beacon) && !self.daemon.config.beaconlog);
        if !skip_dump {
            if let Some(dump) = &mut self.daemon.dump {
                dump.dump_packet(&info)?;
                match dump.maybe_rotate() {
                    Ok(Some(rotation_status)) => {
                        self.daemon.server.send_to_all(&format!("*STATUS {rotation_status}\n"));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        let err = DaemonError::RotationFailed(e.to_string());
                        self.daemon.server.send_to_all(&format!("*STATUS {err}\n"));
                        self.daemon.server.flush_writes()?;
                        return Err(err.into());
                    }
                }
            }
        }
        if let Some(weak) = &mut self.daemon.weak {
            weak.dump_packet(&info)?;
        }

        let packtype_mask = ClientOptions {
            send_strings: -1,
            send_packtype: 1,
        };
        self.daemon.server.send_to_all_opts(
            &format!("*PACKET {}\n", crate::tracker::wire::packet_to_string(&info)),
            packtype_mask,
        );

        if matches!(info.kind, crate::packet::FrameKind::Data) && !info.encrypted {
            let strings_mask = ClientOptions {
                send_strings: 1,
                send_packtype: -1,
            };
            for s in &info.strings {
                self.daemon
                    .server
                    .send_to_all_opts(&format!("*STRING {s}\n"), strings_mask);
            }
        }

        if matches!(info.kind, crate::packet::FrameKind::Noise) {
            if info.time - self.last_traffic_sound >= self.daemon.config.decay {
                self.daemon.sound.play("junktraffic");
                self.last_traffic_sound = info.time;
            }
        } else {
            let total = self.daemon.tracker.fetch_num_packets();
            if total != self.last_packet_total {
                self.last_packet_total = total;
                if info.time - self.last_traffic_sound >= self.daemon.config.decay {
                    self.daemon.sound.play("traffic");
                    self.last_traffic_sound = info.time;
                }
            }
        }

        Ok(())
    }

    fn run_wallclock_tick(&mut self, now: i64) -> Result<()> {
        let mut fix = GpsFix::NONE;
        match self.daemon.gps.scan() {
            Ok(mode) => {
                fix = self.daemon.gps.fetch_loc();
                if mode != self.last_gps_mode {
                    let status = if mode > 0 { "Acquired GPS signal" } else { "Lost GPS signal" };
                    self.daemon.server.send_to_all(&format!("*STATUS {status}\n"));
                    self.daemon.sound.play(if mode > 0 { "gpslock" } else { "gpslost" });
                    self.last_gps_mode = mode;
                }
            }
            Err(e) => {
                let err = DaemonError::GpsTransient(e.to_string());
                self.daemon.server.send_to_all(&format!("*STATUS {err}\n"));
            }
        }
        self.daemon.tracker.set_gps_fix(if fix.has_fix() { Some(fix) } else { None });

        if let Some(trail) = &mut self.daemon.gps_trail {
            trail.append_fix(now, fix)?;
        }

        self.daemon.server.send_to_all(&format!("*TIME {now}\n"));
        self.daemon.server.send_to_all(&format!(
            "*GPS {} {} {} {} {}\n",
            fix.lat, fix.lon, fix.alt, fix.spd, fix.mode
        ));
        let channels = self.daemon.channel_power.vector(now, self.daemon.config.decay);
        let channel_str = channels
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        self.daemon.server.send_to_all(&format!(
            "*INFO {} {} {} {} {} {} {}\n",
            self.daemon.tracker.fetch_num_networks(),
            self.daemon.tracker.fetch_num_packets(),
            self.daemon.tracker.fetch_num_crypt(),
            self.daemon.tracker.fetch_num_interesting(),
            self.daemon.tracker.fetch_num_noise(),
            self.daemon.tracker.fetch_num_dropped(),
            channel_str
        ));

        let mut to_remove = Vec::new();
        for net in self.daemon.tracker.fetch_networks() {
            if net.last_time < self.last_write {
                continue;
            }
            if net.classification == crate::tracker::Classification::Remove {
                self.daemon.server.send_to_all(&format!("*REMOVE {}\n", net.bssid));
                to_remove.push(net.bssid);
            } else {
                self.daemon
                    .server
                    .send_to_all(&format!("*NETWORK {}\n", crate::tracker::wire::net_to_string(net)));
                for cdp in net.cisco_equip.values() {
                    self.daemon.server.send_to_all(&format!(
                        "*CISCO {} {}\n",
                        net.bssid,
                        crate::tracker::wire::cdp_to_string(cdp)
                    ));
                }
            }
        }
        for bssid in to_remove {
            self.daemon.tracker.remove_network(bssid);
        }
        self.last_write = now;

        self.daemon.server.flush_writes()?;
        Ok(())
    }
}

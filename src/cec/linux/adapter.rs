//! CEC adapter backed by the Linux kernel CEC framework (/dev/cecN).
//!
//! `LinuxCecAdapter::open()` queries the adapter's capabilities, claims one
//! logical address per configured device type and enters initiator + follower
//! mode, all on the calling thread so failures surface immediately.
//! `start()` then spawns a reader thread that polls the descriptor, turns
//! received frames and kernel events into `CecEvent`s and hands them to the
//! callback. `close()` stops and joins that thread before releasing the
//! logical addresses.
//!
//! Required permissions: read/write access to /dev/cecN (usually the `video`
//! group).

use std::fs::{File, OpenOptions};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use super::ioctl::{self, CecCaps, CecLogAddrs, CecMsg};
use super::keys::KeyTracker;
use crate::cec::{
    format_frame, Alert, CecAdapter, CecCommand, CecError, CecEvent, CecVersion, DeviceType,
    KeyPress, LogLevel, LogicalAddress, Opcode, SessionConfig,
};

/// Longest the reader thread sleeps before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

type Callback = Arc<dyn Fn(CecEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

pub struct LinuxCecAdapter {
    path: PathBuf,
    device: Arc<File>,
    logical_address: LogicalAddress,
    callback: Option<Callback>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    closed: bool,
}

impl LinuxCecAdapter {
    /// Opens `path` and registers `config` on the bus.
    pub fn open(path: &Path, config: &SessionConfig) -> Result<Self, CecError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| CecError::Open { path: path.to_owned(), source })?;
        let fd = device.as_raw_fd();

        let mut caps = CecCaps::default();
        // SAFETY: `fd` is an open CEC device and `caps` matches `struct cec_caps`.
        unsafe { ioctl::cec_adap_g_caps(fd, &mut caps) }.map_err(io_error("CEC_ADAP_G_CAPS"))?;
        log::info!(
            "cec: {} ({}) at {}",
            caps.adapter_name(),
            caps.driver_name(),
            path.display()
        );
        check_capabilities(&caps, config.device_types.len())?;

        let logical_address = claim_logical_addresses(fd, config)?;
        log::info!(
            "cec: registered {:?} as logical address {}",
            config.device_name,
            logical_address.as_u8()
        );

        let mode = ioctl::CEC_MODE_INITIATOR | ioctl::CEC_MODE_FOLLOWER;
        // SAFETY: CEC_S_MODE reads a single u32.
        unsafe { ioctl::cec_s_mode(fd, &mode) }.map_err(io_error("CEC_S_MODE"))?;

        Ok(Self {
            path: path.to_owned(),
            device: Arc::new(device),
            logical_address,
            callback: None,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
            closed: false,
        })
    }

    fn transmit(&self, frame: &[u8]) -> Result<(), CecError> {
        if let Some(callback) = &self.callback {
            callback(CecEvent::log(LogLevel::Traffic, format!(">> {}", format_frame(frame))));
        }
        let mut msg = CecMsg::with_frame(frame);
        // SAFETY: `msg` matches `struct cec_msg`; the call blocks until sent.
        unsafe { ioctl::cec_transmit(self.device.as_raw_fd(), &mut msg) }
            .map_err(io_error("CEC_TRANSMIT"))?;
        if msg.tx_status & ioctl::CEC_TX_STATUS_OK == 0 {
            return Err(CecError::Io {
                op: "CEC_TRANSMIT",
                source: std::io::Error::other(format!("tx status {:#04x}", msg.tx_status)),
            });
        }
        Ok(())
    }
}

impl CecAdapter for LinuxCecAdapter {
    fn start(&mut self, callback: Box<dyn Fn(CecEvent) + Send + Sync>) -> Result<(), CecError> {
        if self.closed {
            return Err(CecError::Closed);
        }
        if self.thread.is_some() {
            return Err(CecError::Unsupported("event delivery already started".into()));
        }

        let callback: Callback = Arc::from(callback);
        self.callback = Some(Arc::clone(&callback));

        let device = Arc::clone(&self.device);
        let stop = Arc::clone(&self.stop);
        let thread = thread::Builder::new()
            .name("cec-reader".into())
            .spawn(move || reader_loop(&device, &stop, &*callback))
            .map_err(|source| CecError::Io { op: "spawn reader", source })?;
        self.thread = Some(thread);

        log::info!("cec: listening on {}", self.path.display());
        Ok(())
    }

    fn set_audio_enabled(&mut self, enabled: bool) -> Result<(), CecError> {
        if self.closed {
            return Err(CecError::Closed);
        }
        self.transmit(&system_audio_mode_frame(self.logical_address, enabled))
    }

    fn close(&mut self) -> Result<(), CecError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
        self.callback = None;

        let mut release = CecLogAddrs::default();
        // SAFETY: a zeroed `cec_log_addrs` with num_log_addrs = 0 unregisters.
        unsafe { ioctl::cec_adap_s_log_addrs(self.device.as_raw_fd(), &mut release) }
            .map_err(io_error("CEC_ADAP_S_LOG_ADDRS"))?;
        log::info!("cec: released {}", self.path.display());
        Ok(())
    }
}

impl Drop for LinuxCecAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

fn io_error(op: &'static str) -> impl FnOnce(Errno) -> CecError {
    move |errno| CecError::Io { op, source: errno.into() }
}

fn check_capabilities(caps: &CecCaps, wanted_addrs: usize) -> Result<(), CecError> {
    let required = ioctl::CEC_CAP_LOG_ADDRS | ioctl::CEC_CAP_TRANSMIT;
    if caps.capabilities & required != required {
        return Err(CecError::Unsupported(format!(
            "adapter {} cannot claim logical addresses or transmit",
            caps.adapter_name()
        )));
    }
    if (caps.available_log_addrs as usize) < wanted_addrs {
        return Err(CecError::Unsupported(format!(
            "adapter supports {} logical address(es), {wanted_addrs} needed",
            caps.available_log_addrs
        )));
    }
    Ok(())
}

/// Builds the `cec_log_addrs` request for `config`.
fn log_addrs_for(config: &SessionConfig) -> CecLogAddrs {
    let mut addrs = CecLogAddrs {
        cec_version: match config.cec_version {
            CecVersion::V1_4 => ioctl::CEC_OP_CEC_VERSION_1_4,
        },
        vendor_id: ioctl::CEC_VENDOR_ID_NONE,
        ..CecLogAddrs::default()
    };

    let name = config.device_name.as_bytes();
    let len = name.len().min(addrs.osd_name.len() - 1);
    addrs.osd_name[..len].copy_from_slice(&name[..len]);

    for (i, ty) in config.device_types.iter().take(ioctl::CEC_MAX_LOG_ADDRS).enumerate() {
        let (log_addr_type, primary, all) = match ty {
            DeviceType::AudioSystem => (
                ioctl::CEC_LOG_ADDR_TYPE_AUDIOSYSTEM,
                ioctl::CEC_OP_PRIM_DEVTYPE_AUDIOSYSTEM,
                ioctl::CEC_OP_ALL_DEVTYPE_AUDIOSYSTEM,
            ),
            DeviceType::Tuner => (
                ioctl::CEC_LOG_ADDR_TYPE_TUNER,
                ioctl::CEC_OP_PRIM_DEVTYPE_TUNER,
                ioctl::CEC_OP_ALL_DEVTYPE_TUNER,
            ),
        };
        addrs.log_addr_type[i] = log_addr_type;
        addrs.primary_device_type[i] = primary;
        addrs.all_device_types[i] = all;
        addrs.num_log_addrs += 1;
    }
    addrs
}

/// Clears any previous registration, then claims addresses for `config`.
/// Blocks until the kernel finished polling the bus for free addresses.
fn claim_logical_addresses(fd: RawFd, config: &SessionConfig) -> Result<LogicalAddress, CecError> {
    let mut release = CecLogAddrs::default();
    // SAFETY: both structs match `struct cec_log_addrs`.
    unsafe { ioctl::cec_adap_s_log_addrs(fd, &mut release) }
        .map_err(io_error("CEC_ADAP_S_LOG_ADDRS"))?;

    let mut addrs = log_addrs_for(config);
    // SAFETY: as above.
    unsafe { ioctl::cec_adap_s_log_addrs(fd, &mut addrs) }
        .map_err(io_error("CEC_ADAP_S_LOG_ADDRS"))?;

    match addrs.log_addr[0] {
        _ if addrs.num_log_addrs == 0 => Err(CecError::Unsupported("no logical address claimed".into())),
        ioctl::CEC_LOG_ADDR_INVALID => Err(CecError::Unsupported(
            "all logical addresses for this device type are taken".into(),
        )),
        la => Ok(LogicalAddress::new(la)),
    }
}

/// `<Set System Audio Mode>` broadcast from `from`.
fn system_audio_mode_frame(from: LogicalAddress, enabled: bool) -> [u8; 3] {
    [
        (from.as_u8() << 4) | LogicalAddress::BROADCAST.as_u8(),
        Opcode::SetSystemAudioMode.as_u8(),
        u8::from(enabled),
    ]
}

// ---------------------------------------------------------------------------
// Reader thread
// ---------------------------------------------------------------------------

/// Poll timeout in milliseconds: the poll interval, shortened to the held
/// key's deadline.
fn poll_timeout_ms(deadline: Option<Instant>, now: Instant) -> u16 {
    let wait = deadline
        .map(|d| d.saturating_duration_since(now).min(POLL_INTERVAL))
        .unwrap_or(POLL_INTERVAL);
    // Round up so an expiring key is released on the next wakeup, not one later.
    wait.as_micros().div_ceil(1000).min(u128::from(u16::MAX)) as u16
}

fn reader_loop(device: &File, stop: &AtomicBool, callback: &(dyn Fn(CecEvent) + Send + Sync)) {
    let fd = device.as_raw_fd();
    let mut keys = KeyTracker::new();

    while !stop.load(Ordering::Relaxed) {
        let mut fds = [PollFd::new(device.as_fd(), PollFlags::POLLIN | PollFlags::POLLPRI)];
        let ready = match poll(&mut fds, PollTimeout::from(poll_timeout_ms(keys.deadline(), Instant::now()))) {
            Ok(n) => n,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                callback(CecEvent::log(LogLevel::Error, format!("poll failed: {e}")));
                callback(CecEvent::Alert(Alert::ConnectionLost));
                return;
            }
        };

        if ready > 0 {
            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.contains(PollFlags::POLLPRI) {
                if let Err(e) = dequeue_event(fd, callback) {
                    if report_error(e, "CEC_DQEVENT", callback) {
                        return;
                    }
                }
            }
            if revents.contains(PollFlags::POLLIN) {
                if let Err(e) = receive(fd, &mut keys, callback) {
                    if report_error(e, "CEC_RECEIVE", callback) {
                        return;
                    }
                }
            }
            if revents.intersects(PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL) {
                callback(CecEvent::Alert(Alert::ConnectionLost));
                return;
            }
        }

        if let Some(key) = keys.expire(Instant::now()) {
            callback(key_log(&key));
            callback(CecEvent::Key(key));
        }
    }
}

/// Reports a failed ioctl. Returns `true` when the adapter is gone.
fn report_error(errno: Errno, op: &str, callback: &(dyn Fn(CecEvent) + Send + Sync)) -> bool {
    if errno == Errno::ENODEV {
        callback(CecEvent::Alert(Alert::ConnectionLost));
        return true;
    }
    callback(CecEvent::log(LogLevel::Warning, format!("{op} failed: {errno}")));
    false
}

fn receive(
    fd: RawFd,
    keys: &mut KeyTracker,
    callback: &(dyn Fn(CecEvent) + Send + Sync),
) -> Result<(), Errno> {
    let mut msg = CecMsg::default();
    // SAFETY: POLLIN is set, so the blocking receive returns immediately.
    unsafe { ioctl::cec_receive(fd, &mut msg) }?;

    let frame = msg.frame();
    callback(CecEvent::log(LogLevel::Traffic, format!("<< {}", format_frame(frame))));

    let Some(command) = CecCommand::from_frame(frame) else {
        return Ok(());
    };
    for key in track_keys(&command, keys, Instant::now()) {
        callback(key_log(&key));
        callback(CecEvent::Key(key));
    }
    callback(CecEvent::Command(command));
    Ok(())
}

/// Derives key events from `<User Control Pressed/Released>` frames.
fn track_keys(command: &CecCommand, keys: &mut KeyTracker, now: Instant) -> Vec<KeyPress> {
    match Opcode::from_u8(command.opcode) {
        Some(Opcode::UserControlPressed) => match command.parameters.first() {
            Some(&code) => keys.press(code, now),
            None => Vec::new(),
        },
        Some(Opcode::UserControlReleased) => keys.release(now).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn key_log(key: &KeyPress) -> CecEvent {
    let message = if key.is_release() {
        format!("key {:#04x} released after {} ms", key.code, key.duration.as_millis())
    } else {
        format!("key {:#04x} pressed", key.code)
    };
    CecEvent::log(LogLevel::Debug, message)
}

fn dequeue_event(fd: RawFd, callback: &(dyn Fn(CecEvent) + Send + Sync)) -> Result<(), Errno> {
    let mut event = ioctl::CecEvent::default();
    // SAFETY: POLLPRI is set, so an event is queued.
    unsafe { ioctl::cec_dqevent(fd, &mut event) }?;

    match event.event {
        ioctl::CEC_EVENT_STATE_CHANGE => {
            let pa = event.phys_addr();
            if pa == ioctl::CEC_PHYS_ADDR_INVALID {
                callback(CecEvent::log(
                    LogLevel::Warning,
                    "physical address lost (HDMI cable unplugged?)",
                ));
            } else {
                callback(CecEvent::log(
                    LogLevel::Notice,
                    format!(
                        "physical address {}.{}.{}.{}",
                        pa >> 12,
                        (pa >> 8) & 0xf,
                        (pa >> 4) & 0xf,
                        pa & 0xf
                    ),
                ));
            }
        }
        ioctl::CEC_EVENT_LOST_MSGS => {
            callback(CecEvent::log(
                LogLevel::Warning,
                format!("{} CEC message(s) lost", event.lost_msgs()),
            ));
        }
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogMask;

    fn command(frame: &[u8]) -> CecCommand {
        CecCommand::from_frame(frame).unwrap()
    }

    #[test]
    fn log_addrs_register_audio_system() {
        let mut config = SessionConfig::configure(LogMask::DEFAULT);
        config.device_types = vec![DeviceType::AudioSystem];
        let addrs = log_addrs_for(&config);
        assert_eq!(addrs.num_log_addrs, 1);
        assert_eq!(addrs.log_addr_type[0], ioctl::CEC_LOG_ADDR_TYPE_AUDIOSYSTEM);
        assert_eq!(addrs.primary_device_type[0], ioctl::CEC_OP_PRIM_DEVTYPE_AUDIOSYSTEM);
        assert_eq!(addrs.cec_version, ioctl::CEC_OP_CEC_VERSION_1_4);
        assert_eq!(&addrs.osd_name[..8], b"cec-lirc");
        assert_eq!(addrs.osd_name[8], 0);
    }

    #[test]
    fn log_addrs_register_tuner_second() {
        let mut config = SessionConfig::configure(LogMask::DEFAULT);
        config.device_types = vec![DeviceType::AudioSystem, DeviceType::Tuner];
        let addrs = log_addrs_for(&config);
        assert_eq!(addrs.num_log_addrs, 2);
        assert_eq!(addrs.log_addr_type[1], ioctl::CEC_LOG_ADDR_TYPE_TUNER);
        assert_eq!(addrs.all_device_types[1], ioctl::CEC_OP_ALL_DEVTYPE_TUNER);
    }

    #[test]
    fn capabilities_without_transmit_are_rejected() {
        let caps = CecCaps {
            capabilities: ioctl::CEC_CAP_LOG_ADDRS,
            available_log_addrs: 4,
            ..CecCaps::default()
        };
        assert!(matches!(check_capabilities(&caps, 1), Err(CecError::Unsupported(_))));
    }

    #[test]
    fn capabilities_need_enough_addresses() {
        let caps = CecCaps {
            capabilities: ioctl::CEC_CAP_LOG_ADDRS | ioctl::CEC_CAP_TRANSMIT,
            available_log_addrs: 1,
            ..CecCaps::default()
        };
        assert!(check_capabilities(&caps, 1).is_ok());
        assert!(check_capabilities(&caps, 2).is_err());
    }

    #[test]
    fn audio_mode_frame_is_broadcast_from_own_address() {
        assert_eq!(
            system_audio_mode_frame(LogicalAddress::new(5), true),
            [0x5F, 0x72, 0x01]
        );
        assert_eq!(
            system_audio_mode_frame(LogicalAddress::new(5), false),
            [0x5F, 0x72, 0x00]
        );
    }

    #[test]
    fn user_control_frames_become_key_events() {
        let mut keys = KeyTracker::new();
        let t0 = Instant::now();

        let pressed = track_keys(&command(&[0x05, 0x44, 0x41]), &mut keys, t0);
        assert_eq!(pressed, vec![KeyPress::pressed(0x41)]);

        let released =
            track_keys(&command(&[0x05, 0x45]), &mut keys, t0 + Duration::from_millis(300));
        assert_eq!(released, vec![KeyPress::released(0x41, Duration::from_millis(300))]);
    }

    #[test]
    fn other_frames_produce_no_key_events() {
        let mut keys = KeyTracker::new();
        assert!(track_keys(&command(&[0x0F, 0x36]), &mut keys, Instant::now()).is_empty());
        // Pressed without an operand is malformed.
        assert!(track_keys(&command(&[0x05, 0x44]), &mut keys, Instant::now()).is_empty());
    }

    #[test]
    fn key_events_are_traced_at_debug_level() {
        let pressed = key_log(&KeyPress::pressed(0x41));
        assert_eq!(pressed, CecEvent::log(LogLevel::Debug, "key 0x41 pressed"));

        let released = key_log(&KeyPress::released(0x43, Duration::from_millis(250)));
        assert_eq!(released, CecEvent::log(LogLevel::Debug, "key 0x43 released after 250 ms"));
    }

    #[test]
    fn poll_timeout_is_capped_by_interval() {
        let now = Instant::now();
        assert_eq!(poll_timeout_ms(None, now), 1000);
        assert_eq!(poll_timeout_ms(Some(now + Duration::from_secs(5)), now), 1000);
    }

    #[test]
    fn poll_timeout_follows_key_deadline() {
        let now = Instant::now();
        assert_eq!(poll_timeout_ms(Some(now + Duration::from_micros(120_500)), now), 121);
        assert_eq!(poll_timeout_ms(Some(now), now), 0);
    }
}

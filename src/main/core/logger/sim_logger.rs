use std::cell::RefCell;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use crossbeam::queue::ArrayQueue;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use once_cell::sync::{Lazy, OnceCell};
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::util::time::TimeParts;

use crate::core::worker::Worker;
use crate::host::node::NodeInfo;

/// Trigger an asynchronous flush when this many lines are queued.
const ASYNC_FLUSH_QD_LINES_THRESHOLD: usize = 100_000;

/// Performs a *synchronous* flush when this many lines are queued, so that a burst of logging
/// pauses until the logger thread catches up instead of growing the queue without bound.
const SYNC_FLUSH_QD_LINES_THRESHOLD: usize = 10 * ASYNC_FLUSH_QD_LINES_THRESHOLD;

/// Logging thread flushes at least this often.
const MIN_FLUSH_FREQUENCY: Duration = Duration::from_secs(10);

static SIM_LOGGER: Lazy<SimLogger> = Lazy::new(SimLogger::new);

/// Wall-clock reference for the elapsed time at the start of each line.
static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Initialize the simulator's logger.
pub fn init(max_log_level: LevelFilter, log_errors_to_stderr: bool) -> Result<(), SetLoggerError> {
    Lazy::force(&START);
    SIM_LOGGER.set_max_level(max_log_level);
    SIM_LOGGER.set_log_errors_to_stderr(log_errors_to_stderr);

    log::set_logger(&*SIM_LOGGER)?;

    // the logger filters on its own
    log::set_max_level(LevelFilter::Trace);

    std::thread::Builder::new()
        .name("sim-logger".to_string())
        .spawn(move || SIM_LOGGER.logger_thread_fn())
        .expect("Unable to spawn the logger thread");

    let default_panic_handler = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // flush on this thread; the logger thread may be the one that panicked
        SIM_LOGGER.flush_records(None).ok();
        default_panic_handler(panic_info);
    }));

    Ok(())
}

/// A logger that attaches simulation context (simulation time and the node whose event is
/// running) to each line. Records are queued lock-free and written by a helper thread.
pub struct SimLogger {
    // the Sender isn't Sync, so it's cloned once per thread into SENDER
    command_sender: Mutex<Sender<LoggerCommand>>,
    // locked by the logger thread for as long as it runs
    command_receiver: Mutex<Receiver<LoggerCommand>>,
    records: ArrayQueue<SimLogRecord>,
    // when false, every record triggers an asynchronous flush
    buffering_enabled: RwLock<bool>,
    max_log_level: OnceCell<LevelFilter>,
    log_errors_to_stderr: OnceCell<bool>,
}

thread_local!(static SENDER: RefCell<Option<Sender<LoggerCommand>>> = const { RefCell::new(None) });
thread_local!(static THREAD_NAME: String = current_thread_name());

fn current_thread_name() -> String {
    std::thread::current().name().unwrap_or("").to_string()
}

impl SimLogger {
    fn new() -> SimLogger {
        let (sender, receiver) = std::sync::mpsc::channel();

        SimLogger {
            records: ArrayQueue::new(SYNC_FLUSH_QD_LINES_THRESHOLD),
            command_sender: Mutex::new(sender),
            command_receiver: Mutex::new(receiver),
            buffering_enabled: RwLock::new(false),
            max_log_level: OnceCell::new(),
            log_errors_to_stderr: OnceCell::new(),
        }
    }

    fn logger_thread_fn(&self) {
        let Ok(command_receiver) = self.command_receiver.lock() else {
            println!("WARNING: Logger thread couldn't take the command channel");
            return;
        };

        loop {
            use std::sync::mpsc::RecvTimeoutError;
            let res = match command_receiver.recv_timeout(MIN_FLUSH_FREQUENCY) {
                Ok(LoggerCommand::Flush(done_sender)) => self.flush_records(done_sender),
                Err(RecvTimeoutError::Timeout) => self.flush_records(None),
                Err(RecvTimeoutError::Disconnected) => return,
            };
            if let Err(e) = res {
                println!("WARNING: Logger couldn't write records: {e}");
            }
        }
    }

    /// Write out the records queued at the time of the call. If `done_sender` is provided, it's
    /// notified after the flush has completed.
    fn flush_records(&self, done_sender: Option<Sender<()>>) -> std::io::Result<()> {
        use std::io::Write;

        // records arriving during the flush wait for the next one
        let mut toflush = self.records.len();

        let stdout_unlocked = std::io::stdout();
        let stdout_locked = stdout_unlocked.lock();
        let mut stdout = std::io::BufWriter::new(stdout_locked);

        while toflush > 0 {
            // another thread can be draining the queue while panicking
            let Some(record) = self.records.pop() else {
                break;
            };
            toflush -= 1;

            if record.level <= Level::Error && self.log_errors_to_stderr() {
                let line = format!("{record}");
                write!(stdout, "{line}")?;
                write!(std::io::stderr().lock(), "{line}")?;
            } else {
                write!(stdout, "{record}")?;
            }
        }
        stdout.flush()?;

        if let Some(done_sender) = done_sender {
            // logging from here could deadlock
            done_sender.send(()).unwrap_or_else(|e| {
                println!("WARNING: Logger couldn't notify calling thread: {e:?}")
            });
        }
        Ok(())
    }

    /// When disabled, the logger thread is notified to write each record as soon as it's
    /// created. The calling thread still isn't blocked on the record actually being written.
    pub fn set_buffering_enabled(&self, buffering_enabled: bool) {
        if let Ok(mut writer) = self.buffering_enabled.write() {
            *writer = buffering_enabled;
        }
    }

    /// If the maximum log level has not yet been set, returns `LevelFilter::Trace`.
    pub fn max_level(&self) -> LevelFilter {
        self.max_log_level
            .get()
            .copied()
            .unwrap_or(LevelFilter::Trace)
    }

    /// Only intended to be called from `init()`. Panics if called more than once.
    fn set_max_level(&self, level: LevelFilter) {
        self.max_log_level
            .set(level)
            .expect("Log level was already set")
    }

    fn log_errors_to_stderr(&self) -> bool {
        self.log_errors_to_stderr.get().copied().unwrap_or(false)
    }

    /// Only intended to be called from `init()`. Panics if called more than once.
    fn set_log_errors_to_stderr(&self, val: bool) {
        self.log_errors_to_stderr
            .set(val)
            .expect("Error output was already configured")
    }

    fn flush_sync(&self) {
        let (done_sender, done_receiver) = std::sync::mpsc::channel();
        self.send_command(LoggerCommand::Flush(Some(done_sender)));
        done_receiver.recv().unwrap_or_else(|e| {
            println!("WARNING: Logger thread didn't complete the flush: {e:?}")
        });
    }

    fn flush_async(&self) {
        self.send_command(LoggerCommand::Flush(None));
    }

    fn send_command(&self, cmd: LoggerCommand) {
        SENDER
            .try_with(|thread_sender| {
                let mut thread_sender = thread_sender.borrow_mut();
                if thread_sender.is_none() {
                    if let Ok(lock) = self.command_sender.lock() {
                        *thread_sender = Some(lock.clone());
                    }
                }
                match thread_sender.as_ref() {
                    Some(sender) => sender.send(cmd).unwrap_or_else(|e| {
                        println!("WARNING: Couldn't send command to logger thread: {e:?}");
                    }),
                    None => println!("WARNING: No channel to the logger thread"),
                }
            })
            .unwrap_or_else(|e| {
                println!("WARNING: Couldn't get sender channel to logger thread: {e:?}");
            });
    }
}

impl Log for SimLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut sim_record = SimLogRecord {
            level: record.level(),
            file: record.file_static(),
            module_path: record.module_path_static(),
            line: record.line(),
            message: std::fmt::format(*record.args()),
            wall_time: START.elapsed(),
            emu_time: Worker::current_time(),
            thread_name: THREAD_NAME
                .try_with(|name| name.clone())
                .unwrap_or_else(|_| current_thread_name()),
            node_info: Worker::active_node(),
        };

        loop {
            match self.records.push(sim_record) {
                Ok(()) => break,
                Err(r) => {
                    // full
                    sim_record = r;
                    self.flush_sync();
                }
            }
        }

        if record.level() == Level::Error {
            // likely about to crash
            self.flush_sync();
        } else if self.records.len() > ASYNC_FLUSH_QD_LINES_THRESHOLD
            || !self.buffering_enabled.read().map(|b| *b).unwrap_or(false)
        {
            self.flush_async();
        }
    }

    fn flush(&self) {
        self.flush_sync();
    }
}

struct SimLogRecord {
    level: Level,
    file: Option<&'static str>,
    module_path: Option<&'static str>,
    line: Option<u32>,
    message: String,
    wall_time: Duration,

    emu_time: Option<EmulatedTime>,
    thread_name: String,
    node_info: Option<Arc<NodeInfo>>,
}

impl std::fmt::Display for SimLogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        {
            let parts = TimeParts::from_nanos(self.wall_time.as_nanos());
            write!(
                f,
                "{:02}:{:02}:{:02}.{:06}",
                parts.hours,
                parts.mins,
                parts.secs,
                parts.nanos / 1000
            )?;
        }
        write!(f, " [{}]", self.thread_name)?;
        if let Some(emu_time) = self.emu_time {
            let sim_time = emu_time.duration_since(&EmulatedTime::SIMULATION_START);
            let parts = TimeParts::from_nanos(sim_time.as_nanos());
            write!(
                f,
                " {:02}:{:02}:{:02}.{:09}",
                parts.hours, parts.mins, parts.secs, parts.nanos
            )?;
        } else {
            write!(f, " n/a")?;
        }
        write!(f, " [{level}]", level = self.level)?;
        match &self.node_info {
            Some(node) => match node.default_ip {
                Some(ip) => write!(f, " [{}:{ip}]", node.name)?,
                None => write!(f, " [{}:n/a]", node.name)?,
            },
            None => write!(f, " [n/a]")?,
        }
        write!(
            f,
            " [{file}:",
            file = self
                .file
                .map(|f| match f.rfind('/') {
                    Some(sep_pos) => &f[(sep_pos + 1)..],
                    None => f,
                })
                .unwrap_or("n/a"),
        )?;
        match self.line {
            Some(line) => write!(f, "{line}")?,
            None => write!(f, "n/a")?,
        }
        writeln!(
            f,
            "] [{module}] {msg}",
            module = self.module_path.unwrap_or("n/a"),
            msg = self.message
        )
    }
}

enum LoggerCommand {
    // takes an optional one-shot channel to notify that the flush has completed
    Flush(Option<Sender<()>>),
}

pub fn set_buffering_enabled(buffering_enabled: bool) {
    SIM_LOGGER.set_buffering_enabled(buffering_enabled);
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use sim_helper::simulation_time::SimulationTime;
    use sim_helper::NodeId;

    use super::*;

    fn record(emu_time: Option<EmulatedTime>, node_info: Option<Arc<NodeInfo>>) -> SimLogRecord {
        SimLogRecord {
            level: Level::Info,
            file: Some("src/main/routing/flooding.rs"),
            module_path: Some("slp_sim::routing::flooding"),
            line: Some(42),
            message: "hello".into(),
            wall_time: Duration::from_millis(1500),
            emu_time,
            thread_name: "main".into(),
            node_info,
        }
    }

    #[test]
    fn test_format_with_context() {
        let t = EmulatedTime::SIMULATION_START + SimulationTime::from_millis(61_250);
        let node = Arc::new(NodeInfo {
            id: NodeId::new(1),
            name: "node1".into(),
            default_ip: Some(Ipv4Addr::new(10, 0, 0, 2)),
        });
        assert_eq!(
            record(Some(t), Some(node)).to_string(),
            "00:00:01.500000 [main] 00:01:01.250000000 [INFO] [node1:10.0.0.2] \
             [flooding.rs:42] [slp_sim::routing::flooding] hello\n"
        );
    }

    #[test]
    fn test_format_without_context() {
        assert_eq!(
            record(None, None).to_string(),
            "00:00:01.500000 [main] n/a [INFO] [n/a] \
             [flooding.rs:42] [slp_sim::routing::flooding] hello\n"
        );
    }
}

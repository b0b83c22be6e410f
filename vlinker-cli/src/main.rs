use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use vlinker_capture::{
    CancellationToken, ProfileBuildRequest, analyze_capture, build_profile, get_profile,
    parse_capture_file, run_capture,
};
use vlinker_transport::{
    ConnectionManager, ConnectionStatus, ManagerError, SerialLinkExt, TransportOptions, discover_device,
    list_devices,
};
use vlinker_uds::{clear_dtc_uds, coding, read_dtc, read_measure_uds, security_access_with_profile, tester_present};

use crate::cli_helpers::{DidArg, HexBytesArg};

mod api;
mod cli_helpers;

#[derive(clap::Parser)]
#[command(name = "vlinker", about = "ISO-TP / UDS vehicle diagnostics toolkit")]
struct Args {
    #[command(flatten)]
    global: GlobalOpts,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Args)]
struct GlobalOpts {
    /// Serial device path; overrides VLINKER_DEVICE and auto-discovery.
    #[arg(long, global = true)]
    device: Option<String>,

    #[arg(long, default_value_t = 115_200, global = true)]
    baud: u32,

    /// ISO-TP CAN payload size per frame.
    #[arg(long, default_value_t = 8, global = true)]
    mtu: usize,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// List every /dev/ttyUSB* candidate device.
    List,
    /// Connect once, run the adapter probe battery, and print the results.
    Info,
    /// Print the device discover_device() would pick, or exit 1.
    Detect,
    #[command(subcommand)]
    Serial(SerialCommand),
    #[command(subcommand)]
    Diag(DiagCommand),
    #[command(subcommand)]
    Adv(AdvCommand),
    #[command(subcommand)]
    Can(CanCommand),
    #[command(subcommand)]
    Capture(CaptureCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(clap::Subcommand)]
enum SerialCommand {
    /// Open the device and immediately close it again (connectivity check).
    Open,
    /// Send a raw hex payload and print the hex response.
    SendHex { hex: HexBytesArg },
    /// Send an AT/ASCII command line and print the raw response text.
    At { command: String },
}

#[derive(clap::Subcommand)]
enum DiagCommand {
    /// Run the adapter probe battery (ASCII + ISO-TP).
    Scan,
    /// Read DTCs (UDS 0x19, falling back to OBD-II mode 03).
    ReadDtc,
    /// Clear DTCs (UDS 0x14). Destructive: requires --force.
    ClearDtc {
        #[arg(long)]
        force: bool,
    },
    /// Read a measurement by Data Identifier (UDS 0x22).
    Measure { did: DidArg },
    /// Send a raw hex payload over ISO-TP and print the hex response.
    SendHex { hex: HexBytesArg },
}

#[derive(clap::Subcommand)]
enum AdvCommand {
    /// Request a SecurityAccess seed and print it (manual mode).
    ReqSeed {
        #[arg(long, default_value_t = 0x01)]
        sub_function: u8,
    },
    /// Send a precomputed SecurityAccess key (sub_function + 1).
    SendKey {
        #[arg(long, default_value_t = 0x01)]
        sub_function: u8,
        key: HexBytesArg,
    },
    /// Send a raw UDS request over ISO-TP and print the decoded response.
    Uds { hex: HexBytesArg },
    /// Send a TesterPresent (0x3E) keep-alive.
    TesterPresent,
    /// Long-coding bitfield operations.
    #[command(subcommand)]
    Coding(CodingCommand),
    /// Request a seed and, if the named profile carries a transform,
    /// compute and send the key automatically.
    SecAccess {
        #[arg(long, default_value_t = 0x01)]
        sub_function: u8,
        #[arg(long)]
        profile: String,
    },
}

#[derive(clap::Subcommand)]
enum CodingCommand {
    /// Print one bit of a coding string.
    GetBit {
        coding: HexBytesArg,
        byte_index: usize,
        bit_index: usize,
    },
    /// Print a coding string with one bit flipped.
    SetBit {
        coding: HexBytesArg,
        byte_index: usize,
        bit_index: usize,
        value: u8,
    },
    /// Write a coding string back to an ECU via 0x2E.
    Write {
        identifier_hex: String,
        coding: HexBytesArg,
    },
}

#[derive(clap::Subcommand)]
enum CanCommand {
    /// Attach to a slcan-speaking serial adapter.
    AttachSlcan,
    /// Attach via a python-can-compatible bridge.
    AttachPycan,
}

#[derive(clap::Subcommand)]
enum CaptureCommand {
    /// Capture everything read off the wire to a journal file.
    Start {
        output: PathBuf,
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Parse a capture journal and print its records.
    Parse { input: PathBuf },
}

#[derive(clap::Subcommand)]
enum ProfileCommand {
    /// Propose seed→key transform candidates from a capture journal.
    Analyze { input: PathBuf },
    /// Build and (unless --dry-run) write a new profile file.
    Build {
        path: PathBuf,
        name: String,
        #[arg(long, default_value = "reverse")]
        algo: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },
    /// List the built-in profile registry.
    Interactive,
}

/// Guarantees [`ConnectionManager::disconnect`] runs on every exit path —
/// early return, `?`, or panic — for the duration of one CLI invocation.
struct ConnectionGuard<'a> {
    manager: &'a ConnectionManager,
}

impl<'a> ConnectionGuard<'a> {
    fn open(manager: &'a ConnectionManager, device: Option<String>) -> Result<Self> {
        match manager.connect(device) {
            Ok(_) => Ok(Self { manager }),
            Err(ManagerError::Device(e)) => {
                eprintln!("error: {e}");
                std::process::exit(2);
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.manager.disconnect();
    }
}

fn main() -> Result<()> {
    init_logging()?;
    let Args { global, command } = Args::parse();
    let options = TransportOptions {
        baud: global.baud,
        mtu: global.mtu,
        ..TransportOptions::default()
    };

    match command {
        CliCommand::List => cmd_list(),
        CliCommand::Info => cmd_info(&options, global.device),
        CliCommand::Detect => cmd_detect(global.device),
        CliCommand::Serial(cmd) => cmd_serial(cmd, &options, global.device),
        CliCommand::Diag(cmd) => cmd_diag(cmd, &options, global.device),
        CliCommand::Adv(cmd) => cmd_adv(cmd, &options, global.device),
        CliCommand::Can(cmd) => cmd_can(cmd),
        CliCommand::Capture(cmd) => cmd_capture(cmd, &options, global.device),
        CliCommand::Profile(cmd) => cmd_profile(cmd),
    }
}

fn cmd_list() -> Result<()> {
    let devices = list_devices();
    if devices.is_empty() {
        println!("(no /dev/ttyUSB* devices found)");
    }
    for device in devices {
        println!("{device}");
    }
    Ok(())
}

fn cmd_detect(device: Option<String>) -> Result<()> {
    let path = match device {
        Some(p) => p,
        None => match discover_device() {
            Ok(p) => p,
            Err(_) => {
                eprintln!("no device found");
                std::process::exit(1);
            }
        },
    };
    println!("{path}");
    Ok(())
}

fn cmd_info(options: &TransportOptions, device: Option<String>) -> Result<()> {
    let manager = ConnectionManager::new(options.clone());
    let _guard = ConnectionGuard::open(&manager, device)?;
    match manager.status() {
        ConnectionStatus::Connected { path } => println!("connected: {path}"),
        ConnectionStatus::Disconnected => unreachable!("guard just connected"),
    }
    let probes = manager.scan()?;
    for probe in probes {
        println!("{:>8} -> {} ({})", probe.probe.trim(), probe.resp_hex, probe.resp_ascii.trim());
    }
    Ok(())
}

fn cmd_serial(cmd: SerialCommand, options: &TransportOptions, device: Option<String>) -> Result<()> {
    let manager = ConnectionManager::new(options.clone());
    let _guard = ConnectionGuard::open(&manager, device)?;
    match cmd {
        SerialCommand::Open => {
            println!("ok");
        }
        SerialCommand::SendHex { hex } => {
            let resp = manager.with_link(|link, options| link.send_bytes(options, &hex.0))??;
            println!("{}", hex::encode_upper(resp));
        }
        SerialCommand::At { command } => {
            let resp = manager.with_link(|link, options| link.send_ascii_line(options, &command))??;
            println!("{}", String::from_utf8_lossy(&resp).trim());
        }
    }
    Ok(())
}

fn cmd_diag(cmd: DiagCommand, options: &TransportOptions, device: Option<String>) -> Result<()> {
    let manager = ConnectionManager::new(options.clone());
    let _guard = ConnectionGuard::open(&manager, device)?;
    match cmd {
        DiagCommand::Scan => {
            let probes = manager.scan()?;
            for probe in probes {
                println!("{:>8} -> {}", probe.probe.trim(), probe.resp_hex);
            }
        }
        DiagCommand::ReadDtc => {
            let dtcs = manager.with_link(|link, options| read_dtc(link, options))??;
            if dtcs.is_empty() {
                println!("no DTCs");
            }
            for dtc in dtcs {
                println!("{}", dtc.code);
            }
        }
        DiagCommand::ClearDtc { force } => {
            if !force {
                eprintln!("refusing to clear DTCs without --force");
                std::process::exit(2);
            }
            manager.with_link(|link, options| clear_dtc_uds(link, options))??;
            println!("cleared");
        }
        DiagCommand::Measure { did } => {
            let value = manager.with_link(|link, options| read_measure_uds(link, options, did.0))??;
            println!("{did} = {} ({})", value.raw_hex, value.ascii.as_deref().unwrap_or("-"));
        }
        DiagCommand::SendHex { hex } => {
            let resp = manager.with_link(|link, options| {
                vlinker_transport::transact(link, options, &hex.0)
            })??;
            println!("{}", hex::encode_upper(resp));
        }
    }
    Ok(())
}

fn cmd_adv(cmd: AdvCommand, options: &TransportOptions, device: Option<String>) -> Result<()> {
    let manager = ConnectionManager::new(options.clone());
    let _guard = ConnectionGuard::open(&manager, device)?;
    match cmd {
        AdvCommand::ReqSeed { sub_function } => {
            let outcome = manager
                .with_link(|link, options| security_access_with_profile(link, options, sub_function, None))??;
            println!("seed: {}", hex::encode_upper(&outcome.seed));
        }
        AdvCommand::SendKey { sub_function, key } => {
            let payload = [&[0x27u8, sub_function + 1][..], &key.0].concat();
            let resp = manager.with_link(|link, options| vlinker_transport::transact(link, options, &payload))??;
            println!("{}", hex::encode_upper(resp));
        }
        AdvCommand::Uds { hex } => {
            let resp = manager.with_link(|link, options| vlinker_transport::transact(link, options, &hex.0))??;
            println!("{}", hex::encode_upper(resp));
        }
        AdvCommand::TesterPresent => {
            manager.with_link(|link, options| tester_present(link, options))??;
            println!("ok");
        }
        AdvCommand::Coding(cmd) => cmd_coding(cmd, &manager)?,
        AdvCommand::SecAccess { sub_function, profile } => {
            let profile = get_profile(&profile).ok_or_else(|| eyre!("unknown profile"))?;
            let outcome = manager.with_link(|link, options| {
                security_access_with_profile(link, options, sub_function, profile.transform.as_ref())
            })??;
            println!("mode: {}", outcome.mode);
            println!("seed: {}", hex::encode_upper(&outcome.seed));
            if let Some(key) = outcome.key {
                println!("key: {}", hex::encode_upper(&key));
            }
        }
    }
    Ok(())
}

fn cmd_coding(cmd: CodingCommand, manager: &ConnectionManager) -> Result<()> {
    match cmd {
        CodingCommand::GetBit { coding, byte_index, bit_index } => {
            let bit = coding::get_longcoding_bit(&coding.0, byte_index, bit_index)?;
            println!("{bit}");
        }
        CodingCommand::SetBit { coding, byte_index, bit_index, value } => {
            let updated = coding::set_longcoding_bit(&coding.0, byte_index, bit_index, value)?;
            println!("{}", coding::bytes_to_longcoding_str(&updated));
        }
        CodingCommand::Write { identifier_hex, coding } => {
            manager.with_link(|link, options| {
                vlinker_uds::write_coding(link, options, &identifier_hex, &coding.0)
            })??;
            println!("wrote {} = {}", identifier_hex, coding::bytes_to_longcoding_str(&coding.0));
        }
    }
    Ok(())
}

fn cmd_can(cmd: CanCommand) -> Result<()> {
    match cmd {
        CanCommand::AttachSlcan | CanCommand::AttachPycan => {
            Err(eyre!("CAN arbitration is out of scope for this toolkit; use `serial`/`diag` against an ISO-TP adapter instead"))
        }
    }
}

fn cmd_capture(cmd: CaptureCommand, options: &TransportOptions, device: Option<String>) -> Result<()> {
    match cmd {
        CaptureCommand::Start { output, duration_secs } => {
            let manager = ConnectionManager::new(options.clone());
            let _guard = ConnectionGuard::open(&manager, device)?;
            let token = CancellationToken::new();
            {
                let token = token.clone();
                ctrlc_handler(move || token.cancel());
            }
            let mut file = std::fs::File::create(&output)?;
            manager.with_link(|link, options| {
                run_capture(link, options, &mut file, &token, duration_secs.map(Duration::from_secs))
            })??;
            println!("wrote {}", output.display());
        }
        CaptureCommand::Parse { input } => {
            let text = std::fs::read_to_string(&input)?;
            let records = parse_capture_file(&text);
            for record in &records {
                println!("{}\t{}", record.timestamp, hex::encode_upper(&record.data));
            }
        }
    }
    Ok(())
}

fn cmd_profile(cmd: ProfileCommand) -> Result<()> {
    match cmd {
        ProfileCommand::Analyze { input } => {
            let text = std::fs::read_to_string(&input)?;
            let records = parse_capture_file(&text);
            let rounds = analyze_capture(&records);
            if rounds.is_empty() {
                println!("no SecurityAccess seed/response pairs found");
            }
            for (i, candidates) in rounds.iter().enumerate() {
                println!("seed/key pair #{i}:");
                for candidate in candidates {
                    println!("  {:?} -> {}", candidate.transform, hex::encode_upper(&candidate.key));
                }
            }
        }
        ProfileCommand::Build { path, name, algo, dry_run, force } => {
            let result = build_profile(&ProfileBuildRequest { path, name, algo, dry_run, force })?;
            println!("{}", result.preview);
            if result.written {
                println!("wrote {}", result.profile_path);
            } else {
                println!("(dry run, nothing written)");
            }
        }
        ProfileCommand::Interactive => {
            for profile in vlinker_capture::builtin_profiles() {
                println!("{:<12} {}", profile.name, profile.notes);
            }
        }
    }
    Ok(())
}

fn ctrlc_handler(on_signal: impl Fn() + Send + 'static) {
    let _ = ctrlc::set_handler(on_signal);
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();
    color_eyre::install()?;
    Ok(())
}

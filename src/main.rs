use core::ops::ControlFlow;
use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

extern crate libpinscan;

use libpinscan::ftdi_bitbang::{FtdiBitBang, LINES};
use libpinscan::{scan, Line, Protocol, ScanConfig, ScanProgress, ScanResult};

fn parse_hex(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
}

/// Find JTAG or SWD pins among the lines of an FTDI adapter.
#[derive(Parser)]
#[clap(author, version, about)]
struct Args {
    /// USB vendor id of the adapter
    #[clap(long, default_value = "0x0403", parse(try_from_str = parse_hex))]
    vid: u16,
    /// USB product id of the adapter
    #[clap(long, default_value = "0x6010", parse(try_from_str = parse_hex))]
    pid: u16,
    /// Candidate lines, comma separated (default: all ADBUS lines)
    #[clap(short, long, value_delimiter = ',')]
    pins: Vec<Line>,
    /// More output, repeat for trace
    #[clap(short, long, parse(from_occurrences))]
    verbose: usize,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for a JTAG TAP
    Jtag {
        /// Half TCK period in microseconds
        #[clap(long, default_value = "1")]
        delay_us: u32,
        /// Skip the TRST search once the TAP is found
        #[clap(long)]
        no_trst: bool,
    },
    /// Search for an SWD port
    Swd {
        /// Half SWCLK period in microseconds
        #[clap(long, default_value = "5")]
        delay_us: u32,
        /// Leave the port in SWD mode instead of switching back to JTAG
        #[clap(long)]
        stay_in_swd: bool,
    },
}

fn setup_logger(verbose: usize) -> Result<(), fern::InitError> {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .filter(move |meta| {
            level == log::LevelFilter::Trace || !meta.target().contains("jtag_state_machine")
        })
        .apply()?;
    Ok(())
}

fn show_progress(progress: ScanProgress) -> ControlFlow<()> {
    eprint!("\r{}/{}", progress.attempted, progress.total);
    let _ = std::io::stderr().flush();
    ControlFlow::Continue(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logger(args.verbose)?;

    let candidates: Vec<Line> = if args.pins.is_empty() {
        (0..LINES as Line).collect()
    } else {
        args.pins.clone()
    };

    let mut config = ScanConfig::default();
    let protocol = match args.command {
        Command::Jtag { delay_us, no_trst } => {
            config.jtag_delay_us = delay_us;
            config.detect_trst = !no_trst;
            Protocol::Jtag
        }
        Command::Swd {
            delay_us,
            stay_in_swd,
        } => {
            config.swd_delay_us = delay_us;
            config.switch_to_jtag = !stay_in_swd;
            Protocol::Swd
        }
    };

    let mut bus = FtdiBitBang::new(args.vid, args.pid)?;
    info!("scanning {:?} for {:?}", candidates, protocol);
    let result = scan(&mut bus, protocol, &candidates, &config, show_progress);
    eprintln!();

    match result? {
        ScanResult::Jtag { pins, chain } => {
            println!("JTAG device found");
            println!("  TDI   : {}", pins.tdi);
            println!("  TDO   : {}", pins.tdo);
            println!("  TCK   : {}", pins.tck);
            println!("  TMS   : {}", pins.tms);
            if let Some(trst) = pins.trst {
                println!("  TRST  : {}", trst);
            }
            for (i, id) in chain.iter().enumerate() {
                println!("  IDCODE[{}] : {}", i, id);
            }
            println!("  IR length : {}", chain.ir_len());
        }
        ScanResult::Swd { pins, idcode } => {
            println!("SWD device found");
            println!("  SWDIO  : {}", pins.swdio);
            println!("  SWCLK  : {}", pins.swclk);
            println!("  IDCODE : {}", idcode);
        }
        ScanResult::NotFound => {
            println!("no {:?} device found on {:?}", protocol, candidates);
        }
    }
    Ok(())
}

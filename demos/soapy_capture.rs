// Continuous CS8 capture from a SoapySDR receiver
//
// Configures the receiver, then reads fixed-size blocks as fast as possible and
// reports throughput. Requires the `soapy` feature.

use clap::Parser;
use iqstream_rs::stream_formats;
use iqstream_rs::{Cs8Stream, SoapyDevice, StreamConfig, StreamFlags, StreamLog};
use std::io::{self, Write};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "soapy_capture")]
#[command(version = "1.0")]
#[command(about = "High-speed CS8 acquisition from a SoapySDR receiver")]
struct Args {
    /// SoapySDR device args, e.g. "driver=rtlsdr"
    #[arg(short, long, default_value = "")]
    device: String,

    /// Center frequency in Hz
    #[arg(short, long, default_value_t = 100.0e6)]
    frequency: f64,

    /// Sample rate in samples per second
    #[arg(short, long, default_value_t = 2.048e6)]
    sample_rate: f64,

    /// Receive gain in dB
    #[arg(short, long)]
    gain: Option<f64>,

    /// Complex samples per read (defaults to the stream MTU)
    #[arg(short, long)]
    count: Option<usize>,

    /// Per-burst timeout in milliseconds
    #[arg(short, long, default_value_t = 100)]
    timeout_ms: u64,

    /// Stop after this many seconds
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    #[cfg(feature = "cpu-profiling")]
    let _client = tracy_client::Client::start();

    let log = StreamLog::global();
    let radio = SoapyDevice::open(&args.device)?;
    radio
        .device()
        .set_frequency(soapysdr::Direction::Rx, 0, args.frequency, ())?;
    radio
        .device()
        .set_sample_rate(soapysdr::Direction::Rx, 0, args.sample_rate)?;
    if let Some(gain) = args.gain {
        radio.device().set_gain(soapysdr::Direction::Rx, 0, gain)?;
    }

    if !stream_formats::supports_cs8(&radio, &log) {
        eprintln!("Device does not offer CS8 samples on RX channel 0");
        std::process::exit(1);
    }

    let config = StreamConfig::builder()
        .read_timeout(Duration::from_millis(args.timeout_ms))
        .build();
    let mut stream = Cs8Stream::setup_with_config(&radio, &config, &log)?;
    let count = args.count.unwrap_or(stream.mtu(&log)?);
    stream.activate(&log, StreamFlags::NONE, 0, 0)?;

    println!("SoapySDR Capture");
    println!("================");
    println!("Frequency: {:.3} MHz", args.frequency / 1e6);
    println!("Sample rate: {:.3} MS/s", args.sample_rate / 1e6);
    println!("Block size: {} samples\n", count);

    let mut buffer = vec![0i8; 2 * count];
    let mut flags = [StreamFlags::NONE];
    let mut blocks = 0u64;
    let mut samples = 0u64;
    let start = Instant::now();

    while start.elapsed() < Duration::from_secs(args.seconds) {
        match stream.read_cs8(
            &log,
            &mut [buffer.as_mut_slice()],
            count,
            &mut flags,
            config.read_timeout_us(),
        ) {
            Ok(result) => {
                blocks += 1;
                samples += result.elements_read as u64;
                let rate = samples as f64 / start.elapsed().as_secs_f64();
                print!(
                    "\r{} blocks | {} samples | {:.3} MS/s",
                    blocks,
                    samples,
                    rate / 1e6
                );
                io::stdout().flush()?;
            }
            Err(e) => {
                eprintln!("\nError reading data: {}", e);
                break;
            }
        }
    }
    println!();

    stream.deactivate(&log, StreamFlags::NONE, 0)?;
    stream.close(&log)?;
    Ok(())
}

// Burst accumulation against the stub receiver
//
// This example shows the full stream lifecycle and how a read is assembled from
// short bursts, without any hardware attached.

use clap::Parser;
use iqstream_rs::{Cs8Stream, StreamConfig, StreamFlags, StreamLog, StubDevice};

#[derive(Parser)]
#[command(name = "stub_capture")]
#[command(version = "1.0")]
#[command(about = "Read CS8 samples from the stub receiver")]
struct Args {
    /// Number of complex samples per read
    #[arg(short, long, default_value_t = 10_000, value_parser = parse_count)]
    count: usize,

    /// MTU reported by the stub
    #[arg(short, long, default_value_t = 10_000)]
    mtu: usize,

    /// Sizes of the first bursts, e.g. --bursts 5000,3000,2000
    #[arg(short, long, value_delimiter = ',')]
    bursts: Vec<usize>,

    /// Number of reads to perform
    #[arg(short, long, default_value_t = 3)]
    reads: usize,

    /// Convert to CF64 instead of keeping CS8
    #[arg(long)]
    cf64: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn parse_count(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("count must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
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

    println!("Stub Capture Example");
    println!("====================\n");

    let device = StubDevice::builder()
        .mtu(args.mtu)
        .bursts(args.bursts.iter().copied())
        .build();
    let log = StreamLog::global();
    let config = StreamConfig::default();

    let mut stream = Cs8Stream::setup_with_config(&device, &config, &log)?;
    println!("Stream set up, MTU {}", stream.mtu(&log)?);
    stream.activate(&log, StreamFlags::NONE, 0, 0)?;

    let mut cs8 = vec![0i8; 2 * args.count];
    let mut cf64 = vec![0.0f64; 2 * args.count];

    for i in 0..args.reads {
        let result = if args.cf64 {
            let mut flags = StreamFlags::NONE;
            stream.read_cf64(&log, &mut cf64, args.count, &mut flags, config.read_timeout_us())?
        } else {
            let mut flags = [StreamFlags::NONE];
            stream.read_cs8(
                &log,
                &mut [cs8.as_mut_slice()],
                args.count,
                &mut flags,
                config.read_timeout_us(),
            )?
        };

        if args.cf64 {
            println!(
                "{}. {} samples at {} ns, first IQ = ({}, {})",
                i + 1,
                result.elements_read,
                result.time_ns,
                cf64[0],
                cf64[1]
            );
        } else {
            println!(
                "{}. {} samples at {} ns, first IQ = ({}, {})",
                i + 1,
                result.elements_read,
                result.time_ns,
                cs8[0],
                cs8[1]
            );
        }
    }

    stream.deactivate(&log, StreamFlags::NONE, 0)?;
    stream.close(&log)?;

    let calls = device.calls();
    println!(
        "\nBackend saw {} reads, {} activations, {} closes",
        calls.reads, calls.activates, calls.closes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_count_is_rejected() {
        assert!(parse_count("0").is_err());
        assert_eq!(parse_count("16"), Ok(16));
        assert!(Args::try_parse_from(["stub_capture", "--count", "0"]).is_err());
        assert_eq!(
            Args::try_parse_from(["stub_capture", "--count", "1"]).map(|a| a.count).ok(),
            Some(1)
        );
    }
}

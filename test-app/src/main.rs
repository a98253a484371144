// netsdr test application -- CLI tool for exercising a NetSDR receiver.
//
// Usage:
//   netsdr-test-app --host 192.168.1.50 info
//   netsdr-test-app --host 192.168.1.50 freq 7074000
//   netsdr-test-app --host 192.168.1.50 freq 14074000 --channel 1
//   netsdr-test-app --host 192.168.1.50 --sample-rate 250000 \
//       stream --duration 10 --output capture.wav
//   netsdr-test-app --host 192.168.1.50 --timeout-ms 1000 --strict stress --count 50
//
// Logging is controlled with RUST_LOG, e.g. RUST_LOG=netsdr_client=trace.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use netsdr_client::{IqReceiver, SdrClient, SdrClientBuilder};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// netsdr test application -- drives a NetSDR receiver from the command line.
#[derive(Parser)]
#[command(name = "netsdr-test-app", version, about)]
struct Cli {
    /// Receiver IP address or hostname.
    #[arg(long)]
    host: String,

    /// TCP control port.
    #[arg(long, default_value_t = 50000)]
    tcp_port: u16,

    /// Local UDP port for IQ data.
    #[arg(long, default_value_t = 60000)]
    udp_port: u16,

    /// IQ output sample rate in hertz, sent during initialization.
    #[arg(long, default_value_t = 100_000)]
    sample_rate: u32,

    /// Per-command response timeout in milliseconds (0 = wait forever).
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Treat NAKs and mismatched responses as errors.
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, initialize the receiver and print the client state.
    Info,

    /// Tune a receiver channel.
    Freq {
        /// Frequency in hertz (e.g. 7074000).
        freq_hz: u64,

        /// Receiver channel.
        #[arg(long, default_value_t = 0)]
        channel: u8,
    },

    /// Start the IQ stream and report packet statistics.
    Stream {
        /// Duration in seconds.
        #[arg(long, default_value_t = 5)]
        duration: u64,

        /// Record the samples to a stereo WAV file (I left, Q right).
        #[arg(long)]
        output: Option<String>,
    },

    /// Rapid-fire retuning to exercise command/response correlation.
    Stress {
        /// Number of retune commands.
        #[arg(long, default_value_t = 100)]
        count: u32,

        /// Starting frequency in hertz.
        #[arg(long, default_value_t = 7_000_000)]
        base_hz: u64,

        /// Frequency step in hertz.
        #[arg(long, default_value_t = 1_000)]
        step_hz: u64,

        /// Receiver channel.
        #[arg(long, default_value_t = 0)]
        channel: u8,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Format a frequency in hertz as a human-readable MHz string.
fn format_freq(hz: u64) -> String {
    let mhz = hz as f64 / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn builder_from_cli(cli: &Cli) -> SdrClientBuilder {
    let builder = SdrClientBuilder::new()
        .host(&cli.host)
        .tcp_port(cli.tcp_port)
        .udp_port(cli.udp_port)
        .sample_rate(cli.sample_rate)
        .validate_responses(cli.strict);

    if cli.timeout_ms > 0 {
        builder.response_timeout(Duration::from_millis(cli.timeout_ms))
    } else {
        builder
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_info(client: &SdrClient, cli: &Cli) {
    println!("Receiver:     {}:{}", cli.host, cli.tcp_port);
    println!("State:        {}", client.state());
    println!("Sample rate:  {} Hz", client.options().sample_rate_hz);
    println!("IQ started:   {}", client.iq_started());
    println!("Strict mode:  {}", client.options().validate_responses);
}

async fn cmd_freq(client: &SdrClient, freq_hz: u64, channel: u8) -> Result<()> {
    client
        .change_frequency(freq_hz, channel)
        .await
        .with_context(|| format!("failed to tune channel {channel}"))?;
    println!("Channel {channel} tuned to {}", format_freq(freq_hz));
    Ok(())
}

async fn cmd_stream(
    client: &SdrClient,
    iq: &mut IqReceiver,
    sample_rate: u32,
    duration_secs: u64,
    output: Option<&str>,
) -> Result<()> {
    let mut writer = match output {
        Some(path) => {
            let spec = hound::WavSpec {
                channels: 2,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let writer = hound::WavWriter::create(path, spec)
                .with_context(|| format!("failed to create WAV file: {path}"))?;
            Some(writer)
        }
        None => None,
    };

    client.start_iq().await.context("failed to start IQ stream")?;
    println!("Streaming for {duration_secs} seconds ...");

    let deadline = Instant::now() + Duration::from_secs(duration_secs);
    let mut packets: u64 = 0;
    let mut samples: u64 = 0;
    let mut malformed: u64 = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, iq.recv()).await {
            Ok(Some(Ok(packet))) => {
                packets += 1;
                samples += packet.samples.len() as u64;
                if let Some(w) = writer.as_mut() {
                    for sample in &packet.samples {
                        w.write_sample(sample.i).context("failed to write WAV sample")?;
                        w.write_sample(sample.q).context("failed to write WAV sample")?;
                    }
                }
            }
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "Malformed IQ datagram");
                malformed += 1;
            }
            Ok(None) => {
                println!("IQ stream closed.");
                break;
            }
            Err(_) => break,
        }
    }

    client.stop_iq().await.context("failed to stop IQ stream")?;

    if let Some(w) = writer {
        w.finalize().context("failed to finalize WAV file")?;
    }

    println!();
    println!("Results:");
    println!("  Packets:        {packets}");
    println!("  Samples:        {samples}");
    println!("  Lost packets:   {}", iq.lost());
    println!("  Malformed:      {malformed}");
    if let Some(path) = output {
        println!("  Written to:     {path}");
    }
    Ok(())
}

async fn cmd_stress(
    client: &SdrClient,
    count: u32,
    base_hz: u64,
    step_hz: u64,
    channel: u8,
) -> Result<()> {
    println!("Stress test: {count} retunes on channel {channel}");

    let mut failures = 0u32;
    let start = Instant::now();

    for i in 0..count {
        let target = base_hz.saturating_add(step_hz.saturating_mul(u64::from(i)));
        if let Err(e) = client.change_frequency(target, channel).await {
            eprintln!("[{}/{count}] {} failed: {e}", i + 1, format_freq(target));
            failures += 1;
        }
    }

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        f64::from(count) / elapsed.as_secs_f64()
    } else {
        0.0
    };

    println!();
    println!("Results:");
    println!("  Total commands: {count}");
    println!("  Failures:       {failures}");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!("  Rate:           {rate:.1} commands/sec");

    if failures > 0 {
        bail!("{failures} out of {count} retune commands failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let (client, mut iq) = builder_from_cli(&cli)
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.tcp_port))?;

    let result = match &cli.command {
        Command::Info => {
            cmd_info(&client, &cli);
            Ok(())
        }
        Command::Freq { freq_hz, channel } => cmd_freq(&client, *freq_hz, *channel).await,
        Command::Stream { duration, output } => {
            cmd_stream(&client, &mut iq, cli.sample_rate, *duration, output.as_deref()).await
        }
        Command::Stress {
            count,
            base_hz,
            step_hz,
            channel,
        } => cmd_stress(&client, *count, *base_hz, *step_hz, *channel).await,
    };

    client.disconnect();
    result
}

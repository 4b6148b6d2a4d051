use crate::cli::{Cli, Commands};
use crate::export;
use crate::terminal::TerminalSink;
use anyhow::{Context, Result};
use picnam_audio::{CaptureFault, CaptureSource, MockCaptureSource, SyntheticSource};
use picnam_experiment::{
    AcceptAllAssets, AssetLoader, DirectoryAssets, OrderGenerator, SessionAbort, SessionConfig,
    SessionControl, SessionGuard, SessionStateMachine, UiSink,
};
use picnam_timing::{HighPrecisionTimer, SimulatedTimer, Timer};
use std::io::BufRead;
use std::path::Path;
use tracing::{info, warn};

pub struct App {
    command: Commands,
    config: SessionConfig,
}

impl App {
    pub fn new(cli: Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SessionConfig::for_variant(cli.variant.into()),
        };
        Ok(Self {
            command: cli.command,
            config,
        })
    }

    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Config => {
                print!("{}", self.config.to_toml()?);
                Ok(())
            }
            Commands::Order { ref participant } => self.print_order(participant),
            Commands::Devices => print_devices(),
            Commands::Run {
                ref participant,
                ref assets,
                ref out,
                ref device,
                synthetic,
                simulate,
            } => {
                let input = match (simulate, synthetic) {
                    (true, _) => Input::Simulated,
                    (false, true) => Input::Synthetic,
                    (false, false) => Input::Microphone(device.clone()),
                };
                self.run_session(participant, assets.as_deref(), out, input)
            }
        }
    }

    fn print_order(&self, participant: &str) -> Result<()> {
        let order = OrderGenerator::from_config(&self.config).build(participant, &self.config.lists)?;
        println!("# participant {} seed {}", participant.trim(), order.seed());
        println!("trial,word,word_id,list,image_file");
        for (i, item) in order.iter().enumerate() {
            println!(
                "{},{},{},{},{}",
                i + 1,
                item.word,
                item.word_id,
                item.list_tag,
                item.image_file
            );
        }
        Ok(())
    }

    fn run_session(
        &self,
        participant: &str,
        assets: Option<&Path>,
        out: &Path,
        input: Input,
    ) -> Result<()> {
        let _guard = SessionGuard::acquire()?;
        let mut ui = TerminalSink::stdout();
        let mut loader: Box<dyn AssetLoader> = match assets {
            Some(dir) => Box::new(DirectoryAssets::new(dir)),
            None => {
                warn!("no asset directory given, images are not checked");
                Box::new(AcceptAllAssets)
            }
        };

        println!("=== PICTURE NAMING ({:?}) ===", self.config.variant);
        let outcome = match input {
            Input::Simulated => {
                info!("dry run on a simulated clock");
                let record_ms = self.config.record_duration_ms;
                self.execute(
                    participant,
                    SimulatedTimer::new(),
                    loader.as_mut(),
                    &mut ui,
                    move |rate, block| {
                        // one full window of silence per trial
                        let samples = record_ms * u64::from(rate) / 1000;
                        let blocks = samples.div_ceil(block.max(1) as u64) as usize;
                        Ok(Box::new(MockCaptureSource::silence(rate, block, blocks)) as Box<dyn CaptureSource>)
                    },
                    |control| {
                        control.begin();
                        Ok(())
                    },
                )
            }
            Input::Synthetic => {
                warn!("recording generated noise, not the microphone");
                println!("Press Enter to start. Type q and Enter to abort.");
                self.execute(
                    participant,
                    HighPrecisionTimer::new(),
                    loader.as_mut(),
                    &mut ui,
                    |rate, block| {
                        Ok(Box::new(SyntheticSource::new(rate, block)) as Box<dyn CaptureSource>)
                    },
                    spawn_operator_input,
                )
            }
            Input::Microphone(device) => {
                println!("Press Enter to start. Type q and Enter to abort.");
                self.execute(
                    participant,
                    HighPrecisionTimer::new(),
                    loader.as_mut(),
                    &mut ui,
                    move |rate, block| open_microphone(device.as_deref(), rate, block),
                    spawn_operator_input,
                )
            }
        };
        self.finish(out, outcome)
    }

    fn execute<T, A, C>(
        &self,
        participant: &str,
        timer: T,
        assets: &mut dyn AssetLoader,
        ui: &mut dyn UiSink,
        acquire: A,
        connect: C,
    ) -> Result<std::result::Result<picnam_experiment::SessionOutput, SessionAbort>>
    where
        T: Timer,
        A: FnOnce(u32, usize) -> std::result::Result<Box<dyn CaptureSource>, CaptureFault>,
        C: FnOnce(SessionControl) -> Result<()>,
    {
        let (machine, control) =
            SessionStateMachine::prepare(self.config.clone(), participant, timer, assets, ui, acquire)?;
        connect(control)?;
        Ok(machine.run(ui))
    }

    fn finish(
        &self,
        out: &Path,
        outcome: Result<std::result::Result<picnam_experiment::SessionOutput, SessionAbort>>,
    ) -> Result<()> {
        match outcome? {
            Ok(output) => {
                let dir = export::write_session(out, &self.config, &output)?;
                println!("Results written to {}", dir.display());
                Ok(())
            }
            Err(SessionAbort { error, partial }) => {
                let dir = export::write_session(out, &self.config, &partial)?;
                println!(
                    "Partial results ({} trials) written to {}",
                    partial.completed_trials(),
                    dir.display()
                );
                Err(error.into())
            }
        }
    }
}

/// Where a session's audio comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    /// A named input device, or the default one.
    Microphone(Option<String>),
    /// Generated noise at device pace.
    Synthetic,
    /// Silence on a simulated clock.
    Simulated,
}

#[cfg(feature = "cpal-audio")]
fn open_microphone(
    device: Option<&str>,
    rate: u32,
    block: usize,
) -> std::result::Result<Box<dyn CaptureSource>, CaptureFault> {
    let source = picnam_audio::CpalCaptureSource::open(device, rate, block)?;
    info!(device = source.device_name(), "recording from the microphone");
    Ok(Box::new(source))
}

#[cfg(not(feature = "cpal-audio"))]
fn open_microphone(
    _device: Option<&str>,
    _rate: u32,
    _block: usize,
) -> std::result::Result<Box<dyn CaptureSource>, CaptureFault> {
    Err(CaptureFault::new(
        "built without microphone support; enable the cpal-audio feature or pass --synthetic",
    ))
}

#[cfg(feature = "cpal-audio")]
fn print_devices() -> Result<()> {
    let devices = picnam_audio::list_input_devices()?;
    if devices.is_empty() {
        println!("no audio input devices found");
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn print_devices() -> Result<()> {
    anyhow::bail!("built without microphone support; enable the cpal-audio feature")
}

/// Reads operator lines from stdin: the first line starts the session and
/// `q` aborts it at any point.
fn spawn_operator_input(control: SessionControl) -> Result<()> {
    std::thread::Builder::new()
        .name("operator-input".into())
        .spawn(move || {
            let mut started = false;
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().eq_ignore_ascii_case("q") {
                    control.abort("operator quit");
                    break;
                }
                if !started {
                    control.begin();
                    started = true;
                }
            }
        })
        .context("spawning stdin reader")?;
    Ok(())
}

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use parlance::audio::{AudioBuffer, CpalSink, PlaybackScheduler};
use parlance::config::{self, Config};
use parlance::session::{AudioSettings, ConversationConfig, FlowClient, SessionDriver};

/// Parlance - talk to a hosted conversational speech service
#[derive(Parser)]
#[command(name = "parlance", version, about)]
struct Cli {
    /// WebSocket endpoint of the conversation service
    #[arg(long, env = "FLOW_URL", default_value = config::DEFAULT_URL)]
    url: String,

    /// API key for the conversation service
    #[arg(long, env = "FLOW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Conversation template to start from
    #[arg(short, long, default_value = "default")]
    template: String,

    /// Template variable as KEY=VALUE (repeatable)
    #[arg(long = "var", value_parser = config::parse_var)]
    vars: Vec<(String, String)>,

    /// Bytes of input audio sent per websocket frame
    #[arg(long, default_value_t = config::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parlance=info",
        1 => "info,parlance=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::new(&cli.url, cli.api_key, cli.template, cli.vars, cli.chunk_size)?;

    let buffer = AudioBuffer::new();
    let sink = CpalSink::new()?;
    let scheduler = PlaybackScheduler::new(buffer.clone(), sink);

    let mut client = FlowClient::new(config.url.clone(), config.api_key.clone(), config.chunk_size);
    let inbound = buffer;
    client.set_audio_handler(Box::new(move |bytes| inbound.push(bytes)));

    let settings = AudioSettings::default();
    let conversation = ConversationConfig {
        template_id: config.template_id.clone(),
        template_variables: config.template_variables.clone(),
    };

    tracing::info!(
        url = %config.url,
        template = %config.template_id,
        "starting conversation - audio is read from stdin"
    );

    let mut session_task = tokio::spawn(async move {
        let input = Box::new(tokio::io::stdin());
        client.run(input, settings, conversation).await
    });
    let mut playback_task = tokio::spawn(scheduler.run());

    // Whichever side finishes (or fails) first, both tasks are awaited
    // before exit - neither is left running detached.
    tokio::select! {
        res = &mut session_task => {
            playback_task.abort();
            let _ = playback_task.await;
            res??;
            tracing::info!("session finished");
        }
        res = &mut playback_task => {
            session_task.abort();
            let _ = session_task.await;
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            session_task.abort();
            playback_task.abort();
            let _ = session_task.await;
            let _ = playback_task.await;
        }
    }

    Ok(())
}

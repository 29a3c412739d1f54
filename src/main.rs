use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use twitch_chat_component::backend::config::{load_config, AppConfig};
use twitch_chat_component::backend::twitch::DeviceCodeGrantFlow;
use twitch_chat_component::component::{
    ChannelEmitter, ChatClientFactory, Component, Twitch, TwitchConfig,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if config.runner.channel.is_empty() {
        error!("No channel configured, set `channel` under [runner]");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> twitch_chat_component::backend::twitch::Result<()> {
    let flow = DeviceCodeGrantFlow::from_settings(&config.twitch).with_prompt(|pending| {
        println!(
            "Open {} and enter the code {}",
            pending.verification_uri, pending.user_code
        );
    });
    let mut twitch = Twitch::with_collaborators(
        Arc::new(flow),
        Arc::new(ChatClientFactory::new(config.twitch.irc_url.clone())),
    );

    let login = TwitchConfig::login(config.runner.channel.clone());
    let (emitter, mut events) = ChannelEmitter::channel();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", event);
        }
    });

    twitch.initialize(&login, Arc::new(emitter)).await?;
    twitch.start(&login).await?;
    info!("Type a line to send it to #{}", config.runner.channel);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if !twitch.is_connected().await {
                        info!("Not connected yet, message dropped");
                    }
                    if let Err(e) = twitch.process(&TwitchConfig::send(line)).await {
                        error!("Failed to send message: {}", e);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    twitch.stop(&login).await?;
    twitch.uninitialize().await?;
    Ok(())
}

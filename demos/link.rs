use std::time::Duration;

use gamelink::{
    events::PlayerRef,
    platform::{MainContext, MemoryPlatform, PlayerId},
    GameEvent, Link, LinkConfig,
};

#[tokio::main]
async fn main() {
    let logger = pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .build();
    let max_level = logger.filter();

    let url = std::env::var("GAMELINK_URL")
        .map_err(|_| {
            println!("No GAMELINK_URL env var or invalid");
            std::process::exit(1);
        })
        .unwrap();

    let config = LinkConfig {
        url,
        identity_token: std::env::var("GAMELINK_IDENTITY").unwrap_or_else(|_| "demo".to_string()),
        registration_token: std::env::var("GAMELINK_REGISTRATION").unwrap_or_default(),
        ..Default::default()
    };

    let mut platform = MemoryPlatform::new();
    let alex = platform.add_player(PlayerId::from_u128(1), "alex", true);

    let (context, runner) = MainContext::channel();
    tokio::spawn(runner.run(platform));

    let link = Link::start(config, context).unwrap();
    link.install_log_forwarding(Box::new(logger), max_level)
        .unwrap();

    let forwarder = link.forwarder();
    let mut ticker = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                log::info!(target: "demo", "{}", link.status());
                forwarder.send(&GameEvent::chat(PlayerRef::from(&alex), "still here"));
            }
        }
    }

    link.shutdown().await;
}

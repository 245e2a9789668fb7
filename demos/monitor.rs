use meteo_link::{Channel, ChannelConfig, Event, Request};
use tracing::Level;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    // Usage: monitor [url] [config.json]
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = match args.get(1) {
        Some(path) => {
            let json = match std::fs::read_to_string(path) {
                Ok(json) => json,
                Err(e) => {
                    eprintln!("Failed to read {}: {}", path, e);
                    return;
                }
            };
            match ChannelConfig::from_json(&json) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{}", e);
                    return;
                }
            }
        }
        None => ChannelConfig::default(),
    };
    if let Some(url) = args.first() {
        config.url = url.clone();
    }

    println!("Monitoring station at {}", config.url);
    println!("- Layout revision: {}", config.layout);
    println!("- Reconnect delay: {:?}", config.reconnect_delay);

    let mut channel = match Channel::spawn_websocket(config) {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };
    if let Err(e) = channel.send(Request::Connect).await {
        eprintln!("{}", e);
        return;
    }

    while let Some(event) = channel.next_event().await {
        match event {
            Event::Connected => println!("Weather station connected"),
            Event::Disconnected => println!("Weather station disconnected"),
            Event::Network { downlink_mbps } => println!("Link speed: {}Mbps", downlink_mbps),
            Event::Data(state) => {
                println!(
                    "{:02}:{:02}:{:02} flight {} top {} | {:.1} C {}% | wind {:.1} kts @ {} (mean {:.1} @ {}) | QNH {:.1}",
                    state.hour,
                    state.minute,
                    state.second,
                    state.flight_number,
                    state.top_number,
                    state.temperature,
                    state.humidity,
                    state.windspeed,
                    state.wind_direction,
                    state.windspeed_mean,
                    state.wind_direction_mean,
                    state.baro_qnh,
                );
            }
        }
    }
}

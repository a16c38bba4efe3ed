use argh::FromArgs;
use bubble_camera::{
    config::{credentials_from_env, Config},
    BubbleCameraNode,
};

#[derive(FromArgs)]
/// Stream H264 NAL units from Bubble protocol cameras
struct Args {
    /// path to the configuration file
    #[argh(option, short = 'c', default = "String::from(\"config.yaml\")")]
    config: String,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(&args.log_level);
    env_logger::init_from_env(env);

    // Load configuration
    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load config from '{}': {}", args.config, e);
            std::process::exit(1);
        }
    };

    let credentials = match credentials_from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load camera credentials: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Loaded configuration with {} cameras", config.cameras.len());

    // Create shutdown channel
    let shutdown_tx = tokio::sync::watch::Sender::new(());

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    // Spawn camera nodes
    let mut tasks = Vec::new();

    for camera_config in config.cameras.iter() {
        log::info!(
            "Starting camera '{}' from {}:{} (ch={}, stream={})",
            camera_config.name,
            camera_config.host,
            camera_config.port,
            camera_config.channel,
            camera_config.stream
        );

        let stream_config = config.stream_config(camera_config, &credentials);
        let node = BubbleCameraNode::new(camera_config.clone(), stream_config);
        let name = camera_config.name.clone();
        let shutdown_tx = shutdown_tx.clone();

        tasks.push(tokio::spawn(async move {
            match node.run(shutdown_tx).await {
                Ok(stats) => log::info!(
                    "Camera '{}' stopped after {} units ({} bytes)",
                    name,
                    stats.units,
                    stats.bytes
                ),
                Err(e) => log::error!("Camera '{}' failed: {}", name, e),
            }
        }));
    }

    // Wait for all tasks to complete
    for task in tasks {
        if let Err(e) = task.await {
            log::error!("Task error: {}", e);
        }
    }

    log::info!("All cameras shut down, exiting");

    Ok(())
}

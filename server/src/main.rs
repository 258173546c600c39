use clap::Parser;
use log::info;
use server::gateway::SessionGateway;
use server::hub::BroadcastHub;
use server::registry::ConnectionRegistry;
use server::rooms::{RoomConfig, RoomService};
use server::store::VersionedStateStore;
use shared::lifecycle::LifecyclePolicy;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Create a room with this slug at startup
    #[clap(long)]
    seed_room: Option<String>,
    /// Room lifetime in hours, stamped into expires_at
    #[clap(long, default_value = "48")]
    room_ttl_hours: i64,
    /// Reject "end match" while still in setup
    #[clap(long)]
    strict_lifecycle: bool,
    /// Enforce one designated goalkeeper per team on roster edits
    #[clap(long)]
    unique_goalkeeper: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let policy = LifecyclePolicy {
        allow_end_from_setup: !args.strict_lifecycle,
        enforce_goalkeeper_unique: args.unique_goalkeeper,
    };

    // Construct the shared components once and inject them everywhere;
    // nothing reaches for ambient global state.
    let store = Arc::new(VersionedStateStore::new(policy));
    let registry = Arc::new(ConnectionRegistry::new());
    let hub = BroadcastHub::new(Arc::clone(&registry));
    let service = RoomService::new(
        Arc::clone(&store),
        hub.clone(),
        RoomConfig {
            ttl: chrono::Duration::hours(args.room_ttl_hours),
        },
    );

    if let Some(slug) = args.seed_room {
        let room = service.create_room(Some(slug)).await?;
        info!(
            "Seeded room {} (slug {}, coach token {})",
            room.room_id, room.slug, room.coach_token
        );
    }

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server listening on {}", address);

    let gateway = Arc::new(SessionGateway::new(registry, hub, store));
    let gateway_handle = tokio::spawn(gateway.run(listener));

    tokio::select! {
        result = gateway_handle => {
            if let Err(e) = result {
                eprintln!("Gateway task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

//! Mock Transaction Source
//!
//! Serves random payment transactions over HTTP in the same shape as the
//! real source: a JSON string whose content is a split-oriented table.
//!
//! Usage: mock_source [port] [fraud_rate] [failure_rate]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

const COLUMNS: [&str; 21] = [
    "cc_num",
    "merchant",
    "category",
    "amt",
    "first",
    "last",
    "gender",
    "street",
    "city",
    "state",
    "zip",
    "lat",
    "long",
    "city_pop",
    "job",
    "dob",
    "trans_num",
    "merch_lat",
    "merch_long",
    "is_fraud",
    "current_time",
];

/// Random transaction generator
struct TransactionGenerator {
    rng: StdRng,
    counter: u64,
    fraud_rate: f64,
}

impl TransactionGenerator {
    fn new(fraud_rate: f64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            counter: 0,
            fraud_rate,
        }
    }

    /// One split-oriented table holding a single transaction
    fn next_payload(&mut self) -> Value {
        self.counter += 1;
        let is_fraud = self.rng.gen_bool(self.fraud_rate);
        let amt: f64 = if is_fraud {
            self.rng.gen_range(500.0..2500.0)
        } else {
            self.rng.gen_range(1.0..250.0)
        };
        let lat: f64 = self.rng.gen_range(25.0..48.0);
        let long: f64 = self.rng.gen_range(-124.0..-70.0);

        let row = json!([
            self.rng.gen_range(1_000_000_000_000_u64..9_999_999_999_999_999),
            format!("fraud_{}", self.random_choice(&["Kirlin and Sons", "Sporer-Keebler", "Haley Group", "Lind-Buckridge"])),
            self.random_choice(&["grocery_pos", "kids_pets", "shopping_net", "gas_transport", "misc_net"]),
            (amt * 100.0).round() / 100.0,
            self.random_choice(&["Jennifer", "Adam", "Jenna", "Robert"]),
            self.random_choice(&["Banks", "Santos", "Brooks", "Smith"]),
            self.random_choice(&["F", "M"]),
            format!("{} Jo Trace", self.rng.gen_range(1..9999)),
            self.random_choice(&["Glendale", "Baton Rouge", "Columbus", "Plano"]),
            self.random_choice(&["CA", "LA", "OH", "TX"]),
            self.rng.gen_range(10000..99999),
            lat,
            long,
            self.rng.gen_range(100..2_000_000),
            self.random_choice(&["Designer", "Advertising account planner", "Surveyor, minerals"]),
            format!("19{}-0{}-1{}", self.rng.gen_range(50..99), self.rng.gen_range(1..9), self.rng.gen_range(0..9)),
            format!("{:032x}", self.rng.gen::<u128>()),
            lat + self.rng.gen_range(-1.0..1.0),
            long + self.rng.gen_range(-1.0..1.0),
            u8::from(is_fraud),
            Utc::now().timestamp_millis(),
        ]);

        json!({
            "columns": COLUMNS,
            "index": [self.counter],
            "data": [row],
        })
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[derive(Clone)]
struct AppState {
    generator: Arc<Mutex<TransactionGenerator>>,
    failure_rate: f64,
}

async fn current_transactions(State(state): State<AppState>) -> Result<Json<String>, StatusCode> {
    let mut generator = state
        .generator
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if generator.rng.gen_bool(state.failure_rate) {
        warn!("Simulating source outage");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let payload = generator.next_payload();
    debug!(n = generator.counter, "Serving transaction");
    // Json of a String body yields the double-encoded form the pipeline expects
    Ok(Json(payload.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_source=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(8000);
    let fraud_rate: f64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let failure_rate: f64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0.0);

    anyhow::ensure!((0.0..=1.0).contains(&fraud_rate), "fraud_rate must be within [0, 1]");
    anyhow::ensure!((0.0..=1.0).contains(&failure_rate), "failure_rate must be within [0, 1]");

    let state = AppState {
        generator: Arc::new(Mutex::new(TransactionGenerator::new(fraud_rate))),
        failure_rate,
    };
    let app = Router::new()
        .route("/current-transactions", get(current_transactions))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(
        port = port,
        fraud_rate = fraud_rate,
        failure_rate = failure_rate,
        "Mock source listening on /current-transactions"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

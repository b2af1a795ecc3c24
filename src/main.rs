use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use turnstile::clock::{Clock, SystemClock};
use turnstile::config::Config;
use turnstile::jobs::imap_source::ImapMailbox;
use turnstile::jobs::payment_checker::PaymentChecker;
use turnstile::jobs::{event_completion, order_expiry, payment_checker};
use turnstile::notify::{ConsoleNotifier, Dispatcher, Notifier, SmtpNotifier};
use turnstile::orders::OrderService;
use turnstile::routes::create_routes;
use turnstile::state::AppState;
use turnstile::store::{PgStore, Store};
use turnstile::tickets::TicketDesk;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => match SmtpNotifier::new(smtp) {
            Ok(notifier) => {
                tracing::info!(host = %smtp.host, "Sending email over SMTP");
                Arc::new(notifier)
            }
            Err(e) => {
                tracing::warn!(error = %e, "SMTP setup failed, logging emails instead");
                Arc::new(ConsoleNotifier::new(smtp.frontend_url.clone()))
            }
        },
        None => {
            tracing::info!("SMTP not configured, logging emails instead");
            Arc::new(ConsoleNotifier::default())
        }
    };

    let orders = Arc::new(OrderService::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        Dispatcher::new(notifier),
        config.orders.clone(),
        config.payment.clone(),
    ));
    let tickets = Arc::new(TicketDesk::new(Arc::clone(&store), Arc::clone(&clock)));

    let checker = config.mailbox.clone().map(|mailbox| {
        let lookback = mailbox.lookback;
        let bank_tag = mailbox.bank_tag.clone();
        PaymentChecker::new(
            Arc::clone(&orders),
            Arc::new(ImapMailbox::new(mailbox)),
            Arc::clone(&clock),
            lookback,
            bank_tag,
        )
    });

    order_expiry::spawn(Arc::clone(&orders), config.schedule.order_sweep_every);
    event_completion::spawn(
        Arc::clone(&store),
        Arc::clone(&clock),
        config.schedule.event_sweep_every,
    );
    match &checker {
        Some(checker) => {
            payment_checker::spawn(checker.clone(), config.schedule.mailbox_scan_every);
        }
        None => tracing::info!("IMAP not configured, bank transfer scanning disabled"),
    }

    let state = AppState {
        orders,
        tickets,
        payment_checker: checker,
    };
    let app: Router = create_routes(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

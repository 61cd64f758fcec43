use std::{fs, path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use marketplace_checkout::{
    config, db,
    entities::FulfillmentStatus,
    events::{self, EventSender},
    services::commerce::AddToCartInput,
    AppState, CheckoutRequest, ServiceError,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let state = initialize().await?;

    let outcome = match cli.command {
        Commands::Migrate => db::run_migrations(&state.db).await.map(|_| {
            println!("Migrations applied");
        }),
        Commands::Checkout(args) => handle_checkout(&state, args).await,
        Commands::Cart(command) => handle_cart_command(&state, command, cli.json).await,
        Commands::Wallet(command) => handle_wallet_command(&state, command, cli.json).await,
        Commands::Orders(command) => handle_orders_command(&state, command, cli.json).await,
        Commands::Stock(command) => handle_stock_command(&state, command).await,
    };

    if let Err(err) = outcome {
        let response = err.to_response();
        eprintln!("{}", serde_json::to_string_pretty(&response)?);
        return Err(anyhow!(err));
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "marketplace-cli",
    about = "Marketplace checkout and wallet operations",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Check out a cart described by a JSON request file
    Checkout(CheckoutArgs),
    #[command(subcommand)]
    Cart(CartCommands),
    #[command(subcommand)]
    Wallet(WalletCommands),
    #[command(subcommand)]
    Orders(OrdersCommands),
    #[command(subcommand)]
    Stock(StockCommands),
}

#[derive(Args)]
struct CheckoutArgs {
    #[arg(long, value_parser = clap::value_parser!(Uuid), help = "Buyer identifier (UUID)")]
    user_id: Uuid,
    #[arg(long, help = "Path to a JSON checkout request")]
    request: PathBuf,
}

#[derive(Subcommand)]
enum CartCommands {
    Add {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        variant_id: Uuid,
        #[arg(long, default_value_t = 1)]
        quantity: i32,
    },
    Remove {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        item_id: Uuid,
    },
    List {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    Create {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
    },
    Balance {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
    },
    TopUp {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
        #[arg(long, value_parser = parse_decimal, help = "Amount to credit")]
        amount: Decimal,
    },
    History {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
    },
    SetPin {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        user_id: Uuid,
        #[arg(long, help = "Six digit PIN")]
        pin: String,
    },
}

#[derive(Subcommand)]
enum OrdersCommands {
    Show {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        order_id: Uuid,
    },
    ForTransaction {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        transaction_id: Uuid,
    },
    SetStatus {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        order_id: Uuid,
        #[arg(long, value_enum)]
        status: StatusArg,
    },
}

#[derive(Subcommand)]
enum StockCommands {
    Show {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        variant_id: Uuid,
    },
    Replenish {
        #[arg(long, value_parser = clap::value_parser!(Uuid))]
        variant_id: Uuid,
        #[arg(long)]
        quantity: i32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    WaitingForPayment,
    WaitingForSeller,
    OnDelivery,
    Delivered,
    Done,
    Complained,
    Refunded,
    Cancelled,
}

impl From<StatusArg> for FulfillmentStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::WaitingForPayment => FulfillmentStatus::WaitingForPayment,
            StatusArg::WaitingForSeller => FulfillmentStatus::WaitingForSeller,
            StatusArg::OnDelivery => FulfillmentStatus::OnDelivery,
            StatusArg::Delivered => FulfillmentStatus::Delivered,
            StatusArg::Done => FulfillmentStatus::Done,
            StatusArg::Complained => FulfillmentStatus::Complained,
            StatusArg::Refunded => FulfillmentStatus::Refunded,
            StatusArg::Cancelled => FulfillmentStatus::Cancelled,
        }
    }
}

async fn initialize() -> Result<AppState> {
    let cfg = config::load_config().context("failed to load application config")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    db::check_connection(&pool)
        .await
        .context("database did not answer ping")?;
    if cfg.auto_migrate {
        db::run_migrations(&pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    let (event_sender, event_rx) = EventSender::channel(cfg.event_channel_capacity);
    tokio::spawn(events::process_events(event_rx));

    Ok(AppState::new(Arc::new(pool), cfg, Arc::new(event_sender)))
}

async fn handle_checkout(state: &AppState, args: CheckoutArgs) -> Result<(), ServiceError> {
    let raw = fs::read_to_string(&args.request).map_err(|e| {
        ServiceError::ValidationError(format!(
            "cannot read {}: {}",
            args.request.display(),
            e
        ))
    })?;
    let request: CheckoutRequest = serde_json::from_str(&raw)
        .map_err(|e| ServiceError::ValidationError(format!("malformed checkout request: {}", e)))?;

    let summary = state.checkout.checkout_cart(args.user_id, request).await?;
    print_json(&summary)
}

async fn handle_cart_command(
    state: &AppState,
    command: CartCommands,
    json: bool,
) -> Result<(), ServiceError> {
    match command {
        CartCommands::Add {
            user_id,
            variant_id,
            quantity,
        } => {
            let item = state
                .carts
                .add_item(
                    user_id,
                    AddToCartInput {
                        variant_id,
                        quantity,
                    },
                )
                .await?;
            if json {
                return print_json(&item);
            }
            println!("Cart item {} • variant {} x{}", item.id, item.variant_id, item.quantity);
        }
        CartCommands::Remove { user_id, item_id } => {
            state.carts.remove_item(user_id, item_id).await?;
            println!("Removed cart item {}", item_id);
        }
        CartCommands::List { user_id } => {
            let items = state.carts.list_items(user_id).await?;
            if json {
                return print_json(&items);
            }
            if items.is_empty() {
                println!("Cart is empty");
            }
            for item in items {
                println!("- {} • variant {} x{}", item.id, item.variant_id, item.quantity);
            }
        }
    }
    Ok(())
}

async fn handle_wallet_command(
    state: &AppState,
    command: WalletCommands,
    json: bool,
) -> Result<(), ServiceError> {
    match command {
        WalletCommands::Create { user_id } => {
            let wallet = state.wallets.create_wallet(user_id).await?;
            if json {
                return print_json(&wallet);
            }
            println!("Wallet {} created for user {}", wallet.id, user_id);
        }
        WalletCommands::Balance { user_id } => {
            let balance = state.wallets.get_balance(user_id).await?;
            if json {
                return print_json(&serde_json::json!({ "user_id": user_id, "balance": balance }));
            }
            println!("{} {}", balance, state.config.checkout.currency);
        }
        WalletCommands::TopUp { user_id, amount } => {
            let entry = state.wallets.top_up(user_id, amount).await?;
            if json {
                return print_json(&entry);
            }
            println!("Credited {} • balance {}", entry.total, entry.balance_after);
        }
        WalletCommands::History { user_id } => {
            let entries = state.wallets.history(user_id).await?;
            if json {
                return print_json(&entries);
            }
            for entry in entries {
                println!(
                    "- {} • {:?} {} • balance {}",
                    entry.created_at.to_rfc3339(),
                    entry.payment_type,
                    entry.total,
                    entry.balance_after
                );
            }
        }
        WalletCommands::SetPin { user_id, pin } => {
            state.wallets.set_pin(user_id, &pin).await?;
            println!("PIN updated");
        }
    }
    Ok(())
}

async fn handle_orders_command(
    state: &AppState,
    command: OrdersCommands,
    json: bool,
) -> Result<(), ServiceError> {
    match command {
        OrdersCommands::Show { order_id } => {
            let (order, items) = state.orders.get_order(order_id).await?;
            if json {
                return print_json(&serde_json::json!({ "order": order, "items": items }));
            }
            println!(
                "Order {} • seller {} • {} • total {}",
                order.id, order.seller_id, order.status, order.total
            );
            for item in items {
                println!(
                    "  - variant {} x{} @ {} = {}",
                    item.variant_id, item.quantity, item.unit_price, item.subtotal
                );
            }
        }
        OrdersCommands::ForTransaction { transaction_id } => {
            let orders = state.orders.orders_for_transaction(transaction_id).await?;
            if json {
                return print_json(&orders);
            }
            for order in orders {
                println!(
                    "- {} • seller {} • {} • {}",
                    order.id, order.seller_id, order.status, order.total
                );
            }
        }
        OrdersCommands::SetStatus { order_id, status } => {
            let order = state.orders.update_status(order_id, status.into()).await?;
            println!("Order {} is now {}", order.id, order.status);
        }
    }
    Ok(())
}

async fn handle_stock_command(
    state: &AppState,
    command: StockCommands,
) -> Result<(), ServiceError> {
    match command {
        StockCommands::Show { variant_id } => {
            println!("{}", state.stock.available(variant_id).await?);
        }
        StockCommands::Replenish {
            variant_id,
            quantity,
        } => {
            let stock = state.stock.replenish(variant_id, quantity).await?;
            println!("Variant {} stock is now {}", variant_id, stock);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), ServiceError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| ServiceError::InternalError(format!("failed to render JSON: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|_| format!("invalid decimal '{raw}'"))
}

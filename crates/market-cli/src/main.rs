// ============================================================================
// market - command-line front end for the prompt marketplace
// ============================================================================
// Usage:
//   market login EMAIL --password PW         Sign in and persist the session
//   market whoami                            Show the signed-in user
//   market prompts list --category 3         Browse prompts
//   market orders create PROMPT_ID           Buy a prompt
//   market reviews gate PROMPT_ID            Can I review this prompt?
//   market session                           Inspect the persisted session
//
// Every action goes through one Marketplace container. A store error is
// printed and the process exits non-zero.
// ============================================================================

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use market_core::sol::sol_to_lamports;
use market_core::{
    ClientConfig, FiatPayment, Marketplace, NewOrder, PaymentOutcome, PaymentRequest, PollConfig, ProfileUpdate,
    PromptFilter, RegisterFields, SessionEvent, SolPayment,
};

/// Prompt marketplace client
#[derive(Parser)]
#[command(name = "market", version, about = "Browse, buy and review prompts from the command line")]
struct Cli {
    /// API base URL (default: MARKET_API_URL or http://localhost:8000/api/v1)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session database path (default: MARKET_DB_PATH or ~/.prompt-market/session.redb)
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account and sign in
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },

    /// Sign out and forget the persisted session
    Logout,

    /// Show (and refresh) the signed-in user's profile
    Whoami,

    /// Update the signed-in user's profile
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
    },

    /// Inspect the persisted session (never prints tokens)
    Session,

    #[command(subcommand)]
    Prompts(PromptCommands),

    #[command(subcommand)]
    Favorites(FavoriteCommands),

    #[command(subcommand)]
    Orders(OrderCommands),

    #[command(subcommand)]
    Reviews(ReviewCommands),

    #[command(subcommand)]
    Wallet(WalletCommands),
}

#[derive(Subcommand)]
enum PromptCommands {
    /// List prompts with optional filters
    List {
        #[arg(long)]
        category: Option<i64>,
        #[arg(long)]
        search: Option<String>,
        /// "field:direction", e.g. price:asc
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
    },
    /// Featured prompts
    Featured,
    /// Full-text search
    Search { query: String },
    /// One prompt in detail
    Show { id: i64 },
    /// All categories
    Categories,
}

#[derive(Subcommand)]
enum FavoriteCommands {
    List,
    /// Add or remove a prompt from favorites
    Toggle { prompt_id: i64 },
    /// Ask the API whether a prompt is favorited
    Check { prompt_id: i64 },
}

#[derive(Subcommand)]
enum OrderCommands {
    List,
    Show {
        id: i64,
    },
    /// Order a prompt at its listed price
    Create {
        prompt_id: i64,
    },
    /// Record a card/bank payment
    PayFiat {
        order_id: i64,
        #[arg(long, default_value = "credit_card")]
        method: String,
        /// JSON payment details passed through to the API
        #[arg(long, default_value = "{}")]
        details: String,
    },
    /// Record a SOL payment signed by your wallet
    PaySol {
        order_id: i64,
        /// Payer wallet address (base58)
        #[arg(long)]
        wallet: String,
        /// Transaction signature returned by the wallet (base58)
        #[arg(long)]
        signature: String,
    },
    /// Poll until the API reports the payment settled or failed
    Await {
        order_id: i64,
        #[arg(long, default_value = "30")]
        attempts: u32,
        #[arg(long, default_value = "2000")]
        interval_ms: u64,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Reviews of a prompt
    List {
        prompt_id: i64,
    },
    /// Your review of a prompt
    Mine {
        prompt_id: i64,
    },
    Create {
        prompt_id: i64,
        #[arg(long)]
        rating: u8,
        #[arg(long, default_value = "")]
        comment: String,
    },
    Update {
        review_id: i64,
        #[arg(long)]
        rating: u8,
        #[arg(long, default_value = "")]
        comment: String,
    },
    Delete {
        review_id: i64,
    },
    /// Whether you may review a prompt, and why not
    Gate {
        prompt_id: i64,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Save a wallet address on your profile and show its balance
    Connect { address: String },
    /// Forget the wallet locally
    Disconnect,
    /// Balance of the wallet saved on your profile
    Balance,
    /// Where a SOL purchase from this seller must be sent
    Seller {
        seller_id: i64,
        /// Amount to convert to lamports for the wallet adapter
        #[arg(long)]
        sol: Option<f64>,
    },
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

/// Turn a store's error field into the process result
fn check(error: Option<String>) -> Result<()> {
    match error {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("market_core=info".parse()?)
                .add_directive("market_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::default();
    if let Some(url) = cli.api_url.clone() {
        config.api_url = url;
    }
    if let Some(path) = cli.db_path.as_deref() {
        config.db_path = Some(path.into());
    }

    let market = Marketplace::new(config)?;
    let mut events = market.subscribe();
    if market.restore().await {
        info!("Restored persisted session");
    }

    let result = run(&market, cli.command, cli.json).await;

    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Expired { redirect } = event {
            eprintln!("Session expired. Sign in again ({}).", redirect);
        }
    }
    result
}

async fn run(market: &Marketplace, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            let ok = market.auth().login(&email, &password).await;
            check(market.auth().error().await)?;
            if ok {
                cmd_whoami_cached(market, json).await?;
            }
            Ok(())
        }
        Commands::Register { username, email, password, full_name } => {
            let fields = RegisterFields { username, email, password, full_name };
            market.auth().register(fields).await;
            check(market.auth().error().await)?;
            cmd_whoami_cached(market, json).await
        }
        Commands::Logout => {
            market.logout().await;
            println!("Signed out.");
            Ok(())
        }
        Commands::Whoami => {
            if !market.session().is_authenticated().await {
                println!("Not signed in.");
                return Ok(());
            }
            market.auth().fetch_me().await;
            check(market.auth().error().await)?;
            cmd_whoami_cached(market, json).await
        }
        Commands::Profile { username, email, full_name } => {
            market.auth().update_user(ProfileUpdate { username, email, full_name }).await;
            check(market.auth().error().await)?;
            cmd_whoami_cached(market, json).await
        }
        Commands::Session => cmd_session(market),
        Commands::Prompts(cmd) => cmd_prompts(market, cmd, json).await,
        Commands::Favorites(cmd) => cmd_favorites(market, cmd, json).await,
        Commands::Orders(cmd) => cmd_orders(market, cmd, json).await,
        Commands::Reviews(cmd) => cmd_reviews(market, cmd, json).await,
        Commands::Wallet(cmd) => cmd_wallet(market, cmd, json).await,
    }
}

async fn cmd_whoami_cached(market: &Marketplace, json: bool) -> Result<()> {
    let Some(user) = market.session().user().await else {
        println!("Not signed in.");
        return Ok(());
    };
    if json {
        return print_json(&user);
    }
    println!("Signed in as {} <{}> (id {}, {:?})", user.username, user.email, user.id, user.role);
    if let Some(name) = &user.full_name {
        println!("Name:   {}", name);
    }
    println!("Wallet: {}", user.wallet_address.as_deref().unwrap_or("-"));
    Ok(())
}

fn cmd_session(market: &Marketplace) -> Result<()> {
    let db = market.session().db();
    let stats = db.stats()?;

    println!("=== Persisted Session ===");
    match db.path() {
        Some(path) => println!("Database: {}", path.display()),
        None => println!("Database: (in memory)"),
    }
    println!();
    println!("User:          {}", stats.persisted_user.as_deref().unwrap_or("-"));
    println!("Authenticated: {}", stats.is_authenticated);
    println!(
        "Access token:  {}",
        stats.access_expires_at.map(|t| format!("expires {}", format_timestamp(t))).unwrap_or_else(|| "none".into())
    );
    println!(
        "Refresh token: {}",
        stats.refresh_expires_at.map(|t| format!("expires {}", format_timestamp(t))).unwrap_or_else(|| "none".into())
    );
    Ok(())
}

// ============================================================================
// Prompts
// ============================================================================

fn print_prompts(prompts: &[market_core::Prompt]) {
    if prompts.is_empty() {
        println!("No prompts found.");
        return;
    }
    println!("{:<6}  {:<40}  {:>8}  {:<5}  {}", "ID", "TITLE", "PRICE", "PAY", "CATEGORY");
    println!("{}", "-".repeat(80));
    for prompt in prompts {
        let title = prompt.title.chars().take(40).collect::<String>();
        let category = prompt
            .category
            .as_ref()
            .map(|c| c.name.clone())
            .or_else(|| prompt.category_id().map(|id| id.to_string()))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<6}  {:<40}  {:>8.2}  {:<5}  {}",
            prompt.id,
            title,
            prompt.price,
            prompt.payment_type().as_str(),
            category
        );
    }
}

async fn cmd_prompts(market: &Marketplace, cmd: PromptCommands, json: bool) -> Result<()> {
    let store = market.prompts();
    match cmd {
        PromptCommands::List { category, search, sort, min_price, max_price, page, page_size } => {
            let filters = PromptFilter {
                search,
                category_id: category,
                sort,
                min_price,
                max_price,
                page,
                page_size,
                featured: None,
            };
            let page = store.get_filtered_prompts(filters).await;
            check(store.state().await.error)?;
            if json {
                return print_json(&page);
            }
            print_prompts(&page.items);
            println!("\nPage {}/{} ({} total)", page.page, page.total_pages.max(1), page.total);
        }
        PromptCommands::Featured => {
            let prompts = store.fetch_featured_prompts().await;
            check(store.state().await.error)?;
            if json {
                return print_json(&prompts);
            }
            print_prompts(&prompts);
        }
        PromptCommands::Search { query } => {
            let prompts = store.search_prompts(&query).await;
            check(store.state().await.error)?;
            if json {
                return print_json(&prompts);
            }
            print_prompts(&prompts);
        }
        PromptCommands::Show { id } => {
            let prompt = store.fetch_prompt_by_id(id).await;
            check(store.state().await.error)?;
            let Some(prompt) = prompt else {
                println!("Prompt {} not found.", id);
                return Ok(());
            };
            if json {
                return print_json(&prompt);
            }
            println!("#{} {}", prompt.id, prompt.title);
            println!("{}", prompt.description);
            println!();
            match (prompt.payment_type(), prompt.sol_price) {
                (market_core::PaymentType::Sol, Some(sol)) => println!("Price:   {} SOL", sol),
                _ => println!("Price:   {:.2}", prompt.price),
            }
            println!("Rating:  {:.1} ({} sales)", prompt.rating, prompt.sales_count);
            if let Some(seller) = &prompt.seller {
                println!("Seller:  {} (id {})", seller.username, seller.id);
            }
            if let Some(content) = &prompt.content {
                println!("\n{}", content);
            }
        }
        PromptCommands::Categories => {
            let categories = store.fetch_categories().await;
            check(store.state().await.error)?;
            if json {
                return print_json(&categories);
            }
            for category in &categories {
                println!("{:<6}  {}", category.id, category.name);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Favorites
// ============================================================================

async fn cmd_favorites(market: &Marketplace, cmd: FavoriteCommands, json: bool) -> Result<()> {
    let store = market.favorites();
    match cmd {
        FavoriteCommands::List => {
            let favorites = store.fetch_favorites().await;
            check(store.state().await.error)?;
            if json {
                return print_json(&favorites);
            }
            if favorites.is_empty() {
                println!("No favorites yet.");
            }
            for favorite in &favorites {
                println!("{:<6}  {:<40}  {:>8.2}", favorite.id, favorite.title, favorite.price);
            }
        }
        FavoriteCommands::Toggle { prompt_id } => {
            // the toggle direction depends on the cached list
            store.fetch_favorites().await;
            check(store.state().await.error)?;
            let favorited = store.toggle_favorite(prompt_id).await;
            check(store.state().await.error)?;
            println!(
                "Prompt {} {} favorites.",
                prompt_id,
                if favorited { "added to" } else { "removed from" }
            );
        }
        FavoriteCommands::Check { prompt_id } => {
            let favorited = store.check_favorite(prompt_id).await;
            check(store.state().await.error)?;
            println!("Prompt {} is {}favorited.", prompt_id, if favorited { "" } else { "not " });
        }
    }
    Ok(())
}

// ============================================================================
// Orders
// ============================================================================

fn print_order(order: &market_core::Order) {
    println!(
        "{:<6}  prompt {:<6}  {:>8.2}  {:<10}  payment {:<10}  {}",
        order.id,
        order.prompt_id,
        order.total_amount,
        order.status,
        order.payment_status.as_deref().unwrap_or("-"),
        order.created_at.as_deref().unwrap_or("")
    );
}

async fn cmd_orders(market: &Marketplace, cmd: OrderCommands, json: bool) -> Result<()> {
    let store = market.orders();
    match cmd {
        OrderCommands::List => {
            let orders = store.fetch_orders().await;
            check(store.state().await.error)?;
            if json {
                return print_json(&orders);
            }
            if orders.is_empty() {
                println!("No orders found.");
            }
            orders.iter().for_each(print_order);
        }
        OrderCommands::Show { id } => {
            let order = store.fetch_order_by_id(id).await;
            check(store.state().await.error)?;
            match order {
                Some(order) if json => return print_json(&order),
                Some(order) => print_order(&order),
                None => println!("Order {} not found.", id),
            }
        }
        OrderCommands::Create { prompt_id } => {
            let prompts = market.prompts();
            let prompt = prompts.fetch_prompt_by_id(prompt_id).await;
            check(prompts.state().await.error)?;
            let Some(prompt) = prompt else {
                bail!("Prompt {} not found", prompt_id);
            };

            let order = store.create_order(NewOrder::for_prompt(&prompt)).await;
            check(store.state().await.error)?;
            let Some(order) = order else {
                return Ok(());
            };
            if json {
                return print_json(&order);
            }
            println!("Created order {} for \"{}\".", order.id, prompt.title);

            if prompt.payment_type() == market_core::PaymentType::Sol {
                if let Some(seller_id) = prompt.seller_id() {
                    if let Some(address) = store.seller_wallet(seller_id).await {
                        let sol = prompt.sol_price.unwrap_or(0.0);
                        println!(
                            "Send {} SOL ({} lamports) to {} then run `market orders pay-sol {}`.",
                            sol,
                            sol_to_lamports(sol),
                            address,
                            order.id
                        );
                    }
                    check(store.state().await.error)?;
                }
            }
        }
        OrderCommands::PayFiat { order_id, method, details } => {
            let payment = PaymentRequest::Fiat(FiatPayment { method, payment_details: details });
            let recorded = store.record_payment(order_id, payment).await;
            check(store.state().await.error)?;
            if json {
                return print_json(&recorded);
            }
            println!("Payment recorded for order {}.", order_id);
        }
        OrderCommands::PaySol { order_id, wallet, signature } => {
            let payment = PaymentRequest::Sol(SolPayment::new(wallet, signature));
            let recorded = store.record_payment(order_id, payment).await;
            check(store.state().await.error)?;
            if json {
                return print_json(&recorded);
            }
            println!(
                "SOL payment recorded for order {}. Run `market orders await {}` to confirm settlement.",
                order_id, order_id
            );
        }
        OrderCommands::Await { order_id, attempts, interval_ms } => {
            let outcome = store
                .await_payment_status(order_id, PollConfig { max_attempts: attempts, interval_ms })
                .await;
            match outcome {
                PaymentOutcome::Settled(order) => println!("Order {} settled ({}).", order.id, order.status),
                PaymentOutcome::Failed(order) => bail!(
                    "Payment for order {} {}",
                    order.id,
                    order.payment_status.as_deref().unwrap_or("failed")
                ),
                PaymentOutcome::Pending => {
                    check(store.state().await.error)?;
                    println!("Order {} is still pending; try again later.", order_id);
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// Reviews
// ============================================================================

fn print_review(review: &market_core::Review) {
    let author = review
        .user_full_name
        .as_deref()
        .or(review.user_username.as_deref())
        .unwrap_or("anonymous");
    println!(
        "#{:<5} {}{}  {}  {}",
        review.id,
        "*".repeat(review.rating as usize),
        " ".repeat(5usize.saturating_sub(review.rating as usize)),
        author,
        review.comment.as_deref().unwrap_or("")
    );
}

async fn cmd_reviews(market: &Marketplace, cmd: ReviewCommands, json: bool) -> Result<()> {
    let store = market.reviews();
    match cmd {
        ReviewCommands::List { prompt_id } => {
            let reviews = store.fetch_prompt_reviews(prompt_id).await;
            check(store.state().await.error)?;
            if json {
                return print_json(&reviews);
            }
            if reviews.is_empty() {
                println!("No reviews yet.");
            }
            reviews.iter().for_each(print_review);
        }
        ReviewCommands::Mine { prompt_id } => match store.fetch_user_review(prompt_id).await {
            Some(review) if json => return print_json(&review),
            Some(review) => print_review(&review),
            None => println!("You have not reviewed prompt {}.", prompt_id),
        },
        ReviewCommands::Create { prompt_id, rating, comment } => {
            let review = store.create_review(prompt_id, rating, &comment).await;
            check(store.state().await.error)?;
            if let Some(review) = review {
                print_review(&review);
            }
        }
        ReviewCommands::Update { review_id, rating, comment } => {
            let review = store.update_review(review_id, rating, &comment).await;
            check(store.state().await.error)?;
            if let Some(review) = review {
                print_review(&review);
            }
        }
        ReviewCommands::Delete { review_id } => {
            store.delete_review(review_id).await;
            check(store.state().await.error)?;
            println!("Deleted review {}.", review_id);
        }
        ReviewCommands::Gate { prompt_id } => {
            let gate = store.review_gate(prompt_id).await;
            println!("{}", gate.message());
            if let market_core::ReviewGate::AlreadyReviewed(review) = &gate {
                print_review(review);
            }
        }
    }
    Ok(())
}

// ============================================================================
// Wallet
// ============================================================================

async fn cmd_wallet(market: &Marketplace, cmd: WalletCommands, json: bool) -> Result<()> {
    let store = market.wallet();
    match cmd {
        WalletCommands::Connect { address } => {
            store.connect_wallet(&address).await;
            let state = store.state().await;
            check(state.error)?;
            println!("Wallet connected: {}", address);
            if let Some(balance) = state.balance {
                println!("Balance: {} SOL", balance);
            }
        }
        WalletCommands::Disconnect => {
            store.disconnect_wallet().await;
            println!("Wallet disconnected locally. The address stays on your profile.");
        }
        WalletCommands::Balance => {
            let balance = store.fetch_balance().await;
            check(store.state().await.error)?;
            if json {
                return print_json(&serde_json::json!({ "balance": balance }));
            }
            if let Some(balance) = balance {
                println!("Balance: {} SOL", balance);
            }
        }
        WalletCommands::Seller { seller_id, sol } => {
            let orders = market.orders();
            let address = orders.seller_wallet(seller_id).await;
            check(orders.state().await.error)?;
            if let Some(address) = address {
                println!("Seller {} wallet: {}", seller_id, address);
                if let Some(sol) = sol {
                    println!("{} SOL = {} lamports", sol, sol_to_lamports(sol));
                }
            }
        }
    }
    Ok(())
}

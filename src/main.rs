//! CLI entry point for shopmate.

mod cli;

use clap::Parser;
use shopmate::assistant::{Assistant, AssistantEvent};
use shopmate::config::load_config;
use shopmate::gateway::{Gateway, ProductQuery};
use shopmate::identity::FileIdentityStore;
use shopmate::render::Renderer;
use shopmate::supervisor::LinkStatus;
use shopmate::types::{PaymentMethod, ShippingAddress};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;

/// How long one-shot mode waits for the assistant's reply.
const ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    init_tracing();

    // Load config.
    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // Apply CLI overrides.
    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(url) = &args.ws_url {
        config.realtime.ws_url = url.clone();
    }
    if args.no_color {
        config.display.color = false;
    }

    let renderer = Renderer::new(config.display.color);

    let identity = match FileIdentityStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let gateway = Arc::new(Gateway::new(&config.api, identity.clone()));
    let mut assistant = Assistant::new(config, identity, gateway);

    if let Err(e) = assistant.start().await {
        renderer.error(&format!("failed to start: {e}"));
        std::process::exit(1);
    }

    let exit_code = if let Some(prompt) = args.prompt.as_deref() {
        run_one_shot(&mut assistant, &renderer, prompt).await
    } else {
        run_repl(&mut assistant, &renderer).await
    };

    assistant.shutdown();
    std::process::exit(exit_code);
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopmate=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Send one message, print the reply, exit.
async fn run_one_shot(assistant: &mut Assistant, renderer: &Renderer, prompt: &str) -> i32 {
    if !assistant.send_message(prompt) {
        renderer.error("not connected; message not sent");
        return 1;
    }
    let reply = tokio::time::timeout(ONE_SHOT_TIMEOUT, async {
        loop {
            match assistant.next_event().await {
                AssistantEvent::TurnCompleted { turn } => break Ok(turn),
                AssistantEvent::Error { message } => break Err(message),
                AssistantEvent::Disconnected { reconnect_in: None } => {
                    break Err("connection lost".to_string())
                }
                _ => {}
            }
        }
    })
    .await;

    match reply {
        Ok(Ok(turn)) => {
            renderer.turn(&turn);
            0
        }
        Ok(Err(message)) => {
            renderer.error(&message);
            1
        }
        Err(_) => {
            renderer.error("timed out waiting for a reply");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Interactive REPL
// ---------------------------------------------------------------------------

/// Request-driven stdin reader. The thread only reads a line after a
/// request token arrives, so credential prompts can take the terminal
/// without racing the line reader.
struct InputLines {
    request_tx: std::sync::mpsc::Sender<()>,
    lines_rx: tokio::sync::mpsc::UnboundedReceiver<String>,
}

impl InputLines {
    fn spawn() -> Self {
        let (request_tx, request_rx) = std::sync::mpsc::channel::<()>();
        let (lines_tx, lines_rx) = tokio::sync::mpsc::unbounded_channel();
        std::thread::spawn(move || {
            while request_rx.recv().is_ok() {
                let mut line = String::new();
                match std::io::stdin().read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if lines_tx.send(line.trim_end().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Self {
            request_tx,
            lines_rx,
        }
    }

    fn request(&self) {
        let _ = self.request_tx.send(());
    }

    async fn next(&mut self) -> Option<String> {
        self.lines_rx.recv().await
    }

    /// Print a prompt and read one line.
    async fn ask(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        self.request();
        self.next().await
    }
}

enum ReplFlow {
    Continue,
    Quit,
}

async fn run_repl(assistant: &mut Assistant, renderer: &Renderer) -> i32 {
    renderer.status(&format!(
        "shopmate {}",
        shopmate::build_info::startup_metadata_line()
    ));
    renderer.status("type a message, or /help for commands");
    let mut input = InputLines::spawn();
    input.request();

    loop {
        tokio::select! {
            line = input.next() => {
                let Some(line) = line else { break };
                match handle_line(assistant, renderer, &mut input, &line).await {
                    ReplFlow::Quit => break,
                    ReplFlow::Continue => input.request(),
                }
            }
            event = assistant.next_event() => {
                render_event(renderer, &event);
            }
        }
    }
    0
}

fn render_event(renderer: &Renderer, event: &AssistantEvent) {
    match event {
        AssistantEvent::Connected => renderer.status("connected"),
        AssistantEvent::Disconnected { reconnect_in } => match reconnect_in {
            Some(delay) => {
                renderer.status(&format!("disconnected, reconnecting in {delay:?}"))
            }
            None => renderer.status("disconnected"),
        },
        AssistantEvent::SessionChanged { session_id } => {
            renderer.status(&format!("session rebound to {session_id}"));
        }
        AssistantEvent::Typing { is_typing, .. } => {
            if *is_typing {
                renderer.status("assistant is typing…");
            }
        }
        AssistantEvent::TurnStarted { agent, .. } => {
            renderer.assistant_label(agent.as_deref());
        }
        AssistantEvent::TurnDelta { delta, .. } => renderer.delta(delta),
        AssistantEvent::TurnCompleted { turn } => {
            if turn.stream_id.is_some() {
                // Streamed text already printed incrementally.
                renderer.end_turn();
            } else {
                renderer.turn(turn);
            }
        }
        AssistantEvent::HistoryLoaded { turns } => {
            renderer.status(&format!("history loaded ({turns} turns)"));
        }
        AssistantEvent::CartUpdated { cart } => {
            renderer.status(&format!(
                "cart updated: {} items, total {:.2}",
                cart.item_count, cart.total
            ));
        }
        AssistantEvent::ProductsSuggested { products } => {
            for product in products {
                renderer.product(product);
            }
        }
        AssistantEvent::Error { message } => renderer.error(message),
    }
}

async fn handle_line(
    assistant: &mut Assistant,
    renderer: &Renderer,
    input: &mut InputLines,
    line: &str,
) -> ReplFlow {
    let line = line.trim();
    if line.is_empty() {
        return ReplFlow::Continue;
    }
    if !line.starts_with('/') {
        if !assistant.send_message(line) {
            renderer.warn("not connected; message not sent");
        }
        return ReplFlow::Continue;
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match command {
        "/help" => print_help(),
        "/quit" | "/exit" => return ReplFlow::Quit,
        "/status" => {
            let status = match assistant.link_status() {
                LinkStatus::Connected => "connected",
                LinkStatus::Connecting => "connecting",
                LinkStatus::Disconnected => "disconnected",
            };
            renderer.status(&format!(
                "{status}; session {}",
                assistant.session_id().unwrap_or("-")
            ));
        }
        "/history" => {
            for turn in assistant.transcript().turns() {
                renderer.turn(turn);
            }
        }
        "/products" => {
            let query = ProductQuery {
                query: (!rest.is_empty()).then(|| rest.join(" ")),
                ..Default::default()
            };
            match assistant.products(&query).await {
                Ok(page) => {
                    for product in &page.products {
                        renderer.product(product);
                    }
                }
                Err(e) => renderer.error(&e.to_string()),
            }
        }
        "/product" => match rest.first() {
            Some(id) => match assistant.product(id).await {
                Ok(product) => renderer.product(&product),
                Err(e) => renderer.error(&e.to_string()),
            },
            None => renderer.warn("usage: /product <productId>"),
        },
        "/cart" => match assistant.refresh_cart().await {
            Ok(cart) => renderer.cart(&cart),
            Err(e) => renderer.error(&e.to_string()),
        },
        "/add" => match (rest.first(), rest.get(1)) {
            (Some(product_id), Some(variant_id)) => {
                let quantity = rest
                    .get(2)
                    .and_then(|q| q.parse().ok())
                    .unwrap_or(1);
                match assistant.add_item(product_id, variant_id, quantity).await {
                    Ok(cart) => renderer.cart(&cart),
                    Err(e) => renderer.error(&e.to_string()),
                }
            }
            _ => renderer.warn("usage: /add <productId> <variantId> [quantity]"),
        },
        "/update" => match (rest.first(), rest.get(1).and_then(|q| q.parse().ok())) {
            (Some(item_id), Some(quantity)) => {
                match assistant.update_item(item_id, quantity).await {
                    Ok(cart) => renderer.cart(&cart),
                    Err(e) => renderer.error(&e.to_string()),
                }
            }
            _ => renderer.warn("usage: /update <itemId> <quantity>"),
        },
        "/remove" => match rest.first() {
            Some(item_id) => match assistant.remove_item(item_id).await {
                Ok(cart) => renderer.cart(&cart),
                Err(e) => renderer.error(&e.to_string()),
            },
            None => renderer.warn("usage: /remove <itemId>"),
        },
        "/checkout" => run_checkout(assistant, renderer, input).await,
        "/orders" => match assistant.orders().await {
            Ok(list) => {
                for order in &list.orders {
                    renderer.order(order);
                }
            }
            Err(e) => renderer.error(&e.to_string()),
        },
        "/order" => match rest.first() {
            Some(id) => match assistant.order(id).await {
                Ok(order) => renderer.order(&order),
                Err(e) => renderer.error(&e.to_string()),
            },
            None => renderer.warn("usage: /order <orderId>"),
        },
        "/login" => match rest.first() {
            Some(email) => {
                let password = match rpassword::prompt_password("password: ") {
                    Ok(p) => p,
                    Err(e) => {
                        renderer.error(&format!("failed to read password: {e}"));
                        return ReplFlow::Continue;
                    }
                };
                match assistant.login(email, &password).await {
                    Ok(user) => renderer.status(&format!("logged in as {}", user.email)),
                    Err(e) => renderer.error(&e.to_string()),
                }
            }
            None => renderer.warn("usage: /login <email>"),
        },
        "/register" => match rest.first() {
            Some(email) => {
                let name = rest.get(1..).map(|r| r.join(" ")).unwrap_or_default();
                let name = if name.is_empty() {
                    match input.ask("name: ").await {
                        Some(name) => name,
                        None => return ReplFlow::Quit,
                    }
                } else {
                    name
                };
                let password = match rpassword::prompt_password("password: ") {
                    Ok(p) => p,
                    Err(e) => {
                        renderer.error(&format!("failed to read password: {e}"));
                        return ReplFlow::Continue;
                    }
                };
                match assistant.register(email, &password, &name).await {
                    Ok(user) => renderer.status(&format!("registered {}", user.email)),
                    Err(e) => renderer.error(&e.to_string()),
                }
            }
            None => renderer.warn("usage: /register <email> [name]"),
        },
        "/logout" => match assistant.logout() {
            Ok(()) => renderer.status("logged out (guest session kept)"),
            Err(e) => renderer.error(&e.to_string()),
        },
        _ => renderer.warn(&format!("unknown command {command}; try /help")),
    }
    ReplFlow::Continue
}

async fn run_checkout(assistant: &mut Assistant, renderer: &Renderer, input: &mut InputLines) {
    let Some(name) = input.ask("recipient name: ").await else { return };
    let Some(line1) = input.ask("address line: ").await else { return };
    let Some(city) = input.ask("city: ").await else { return };
    let Some(state) = input.ask("state: ").await else { return };
    let Some(postal_code) = input.ask("postal code: ").await else { return };
    let Some(country) = input.ask("country: ").await else { return };
    let Some(token) = input.ask("payment token: ").await else { return };

    let address = ShippingAddress {
        name,
        line1,
        city,
        state,
        postal_code,
        country,
    };
    let payment = PaymentMethod {
        kind: "card".to_string(),
        token,
    };
    match assistant.checkout(&address, &payment).await {
        Ok(response) => renderer.status(&format!("order placed: {}", response.order.id)),
        Err(e) => renderer.error(&e.to_string()),
    }
}

fn print_help() {
    println!(
        "\
commands:
  <text>                         send a chat message to the assistant
  /products [query]              list products
  /product <id>                  show one product
  /cart                          show the cart
  /add <productId> <variantId> [qty]
  /update <itemId> <qty>
  /remove <itemId>
  /checkout                      interactive checkout
  /orders, /order <id>           order history
  /login <email>, /register <email> [name], /logout
  /history                       reprint the transcript
  /status                        connection + session status
  /quit"
    );
}

use anyhow::{bail, Context, Result};
use chatblocks::api::ApiClient;
use chatblocks::blocks::BlockRenderer;
use chatblocks::config::Config;
use chatblocks::html;
use chatblocks::markdown;
use chatblocks::state::{IntervalTicks, RandomIds, StreamAssembler, SystemClock, ThreadStore};
use chatblocks::terminal::TerminalView;
use chatblocks::types::{MessageBody, Role, Thread};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: chatblocks <ask PROMPT | retry | edit PROMPT | threads | show ID | delete ID | new>";

enum Command {
    Ask(String),
    Retry,
    Edit(String),
    Threads,
    Show(String),
    Delete(String),
    New,
}

fn parse_command(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        bail!(USAGE);
    };
    let command = match (name.as_str(), rest) {
        ("ask", [_, ..]) => Command::Ask(rest.join(" ")),
        ("retry", []) => Command::Retry,
        ("edit", [_, ..]) => Command::Edit(rest.join(" ")),
        ("threads", []) => Command::Threads,
        ("show", [id]) => Command::Show(id.clone()),
        ("delete", [id]) => Command::Delete(id.clone()),
        ("new", []) => Command::New,
        _ => bail!(USAGE),
    };
    Ok(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CHATBLOCKS_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load()?;
    config.validate()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let store = ThreadStore::load_from_path(
        &config.store_path,
        Arc::new(SystemClock),
        Arc::new(RandomIds),
    )
    .with_context(|| format!("Failed to load threads from {}", config.store_path.display()))?;
    let store = Arc::new(Mutex::new(store));

    match command {
        Command::Ask(prompt) => ask(&config, Arc::clone(&store), Turn::Prompt(&prompt)).await?,
        Command::Retry => ask(&config, Arc::clone(&store), Turn::Retry).await?,
        Command::Edit(prompt) => {
            {
                let mut store = lock(&store);
                let thread_id = store.ensure_active();
                if let Some(previous) = store.last_user_prompt(&thread_id)? {
                    store.remove_user_message(&thread_id, &previous)?;
                }
            }
            ask(&config, Arc::clone(&store), Turn::Prompt(&prompt)).await?
        }
        Command::Threads => print_threads(&lock(&store)),
        Command::Show(id) => {
            let thread = lock(&store).get(&id).cloned();
            match thread {
                Some(thread) => show(&thread).await,
                None => bail!("No thread with id {id}"),
            }
        }
        Command::Delete(id) => {
            let removed = lock(&store).delete(&id)?;
            println!("deleted {} ({})", removed.id, removed.title);
        }
        Command::New => {
            let id = lock(&store).create_thread();
            println!("{id}");
        }
    }

    lock(&store)
        .save_to_path(&config.store_path)
        .with_context(|| format!("Failed to save threads to {}", config.store_path.display()))?;
    Ok(())
}

fn lock(store: &Mutex<ThreadStore>) -> std::sync::MutexGuard<'_, ThreadStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Turn<'a> {
    Prompt(&'a str),
    Retry,
}

async fn ask(config: &Config, store: Arc<Mutex<ThreadStore>>, turn: Turn<'_>) -> Result<()> {
    let thread_id = lock(&store).ensure_active();
    let client = ApiClient::new(config);
    let assembler = StreamAssembler::new(Arc::new(client), store).with_sampling(config.sampling);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut view = TerminalView::stdout();
    let mut ticks = IntervalTicks::new(config.frame_interval);
    let outcome = match turn {
        Turn::Prompt(prompt) => {
            assembler
                .submit(&thread_id, prompt, &mut view, &mut ticks, cancel)
                .await?
        }
        Turn::Retry => {
            assembler
                .retry(&thread_id, &mut view, &mut ticks, cancel)
                .await?
        }
    };

    if let Some(error) = &outcome.error {
        eprintln!("request failed: {error}");
    } else if outcome.cancelled {
        eprintln!("cancelled");
    }
    Ok(())
}

fn print_threads(store: &ThreadStore) {
    let active = store.active_id();
    for thread in store.list() {
        let marker = if active == Some(thread.id.as_str()) { "*" } else { " " };
        println!(
            "{marker} {}  {}  {} messages  {}",
            thread.id,
            thread.sort_key().format("%Y-%m-%d %H:%M"),
            thread.messages.len(),
            thread.title
        );
    }
}

async fn show(thread: &Thread) {
    let renderer = BlockRenderer::default();
    println!("# {}", thread.title);
    for message in &thread.messages {
        let label = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        let body = match &message.body {
            MessageBody::Text(text) => html::to_plain_text(&markdown::render(text)),
            MessageBody::Blocks(blocks) => {
                let mut fragments = Vec::with_capacity(blocks.len());
                for block in blocks {
                    fragments.push(html::to_plain_text(&renderer.render(block).await));
                }
                fragments.join("\n\n")
            }
        };
        println!("\n[{label}]\n{body}");
    }
}

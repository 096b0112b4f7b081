//! Renders one message into a thread list, optionally replays a script of
//! changes against it, and prints the resulting HTML.

use std::{fs, path::PathBuf, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::info;

use message_view::{
    config::MessageViewConfig,
    cx::{Clock, Cx, Event, ManualClock, SystemClock},
    logging,
    markup::{el, Markup},
    model::{DeliveryError, Message, MessageEntity},
    view::MessageView,
};

#[derive(Parser, Debug)]
struct Cli {
    /// A JSON file holding the message to render.
    #[clap(value_parser)]
    message: PathBuf,

    /// A JSON file with view configuration overrides.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// A change to replay after the first render, in order. One of:
    /// `sent`, `delivered`, `pending`, `done`, `expire`, `destroy`,
    /// `body=TEXT`, `network-error=RECIPIENT`, `resolve=ATTACHMENT_ID=URL`,
    /// `animation-end`, `advance=MILLIS`.
    #[clap(short, long = "step")]
    steps: Vec<String>,

    /// Print the actions the view emitted.
    #[clap(short, long, action)]
    verbose: bool,
}

fn apply_step(cx: &mut Cx, clock: &ManualClock, entity: &MessageEntity, view: &mut MessageView, step: &str) -> Result<()> {
    let (name, arg) = match step.split_once('=') {
        Some((name, arg)) => (name, Some(arg)),
        None => (step, None),
    };
    let arg = || arg.ok_or_else(|| anyhow!("step `{name}` needs an argument"));
    match name {
        "sent" => entity.set_sent(true),
        "delivered" => entity.set_delivered(true),
        "pending" => entity.mark_pending(),
        "done" => entity.mark_done(),
        "expire" => entity.expire(),
        "destroy" => entity.destroy(),
        "body" => entity.set_body(arg()?),
        "network-error" => entity.push_error(DeliveryError::network(arg()?)),
        "resolve" => {
            let (attachment_id, url) = arg()?
                .split_once('=')
                .ok_or_else(|| anyhow!("expected `resolve=ATTACHMENT_ID=URL`"))?;
            view.handle_event(cx, &Event::AttachmentResolved {
                attachment_id: attachment_id.to_string(),
                url: url.to_string(),
            });
        }
        "animation-end" => {
            if let Some(bubble) = cx.tree.find_by_class(view.root(), "bubble") {
                view.handle_event(cx, &Event::AnimationEnd(bubble));
            }
        }
        "advance" => {
            let millis: u64 = arg()?.parse().context("`advance` takes a number of milliseconds")?;
            clock.advance(Duration::from_millis(millis));
        }
        other => bail!("unknown step `{other}`"),
    }
    view.process_signals(cx);
    for event in cx.take_due_timers() {
        view.handle_event(cx, &event);
    }
    Ok(())
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let json = fs::read_to_string(&cli.message)
        .with_context(|| format!("failed to read {}", cli.message.display()))?;
    let message: Message = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a valid message", cli.message.display()))?;
    let config = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            MessageViewConfig::from_json_str(&json)?
        }
        None => MessageViewConfig::default(),
    };

    let clock = ManualClock::starting_at(SystemClock.now_millis());
    let mut cx = Cx::new(clock.clone()).with_config(config);
    let list = cx.tree.build(&Markup::from(el("ol").class("discussion")));

    let entity = MessageEntity::new(message);
    let mut view = MessageView::new(&mut cx, entity.clone());
    cx.tree.append_child(list, view.root())?;
    view.render(&mut cx);
    info!("Rendered message {}", entity.id());

    for step in &cli.steps {
        apply_step(&mut cx, &clock, &entity, &mut view, step)
            .with_context(|| format!("step `{step}` failed"))?;
    }

    println!("{}", cx.tree.to_html(list));
    if cli.verbose {
        for action in cx.take_actions() {
            println!("{action:?}");
        }
    }
    Ok(())
}

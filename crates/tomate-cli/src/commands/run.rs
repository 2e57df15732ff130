use std::rc::Rc;

use clap::Args;
use serde::Serialize;
use tokio::sync::Notify;
use tomate_core::{EventBus, Session, SessionEvent, SessionType, Timer, TimerEvent, TokioScheduler};

use super::{open_store, plugin_engine, CmdResult};

#[derive(Args)]
pub struct RunArgs {
    /// Session type to start with (pomodoro, shortbreak, longbreak)
    #[arg(long)]
    session: Option<SessionType>,
    /// Number of sessions to run back to back
    #[arg(long, default_value_t = 1)]
    cycles: u32,
    /// Do not print per-second timer updates
    #[arg(long)]
    no_ticks: bool,
}

#[derive(Serialize)]
struct Line<'a, E, P> {
    channel: &'static str,
    event: E,
    #[serde(flatten)]
    payload: &'a P,
}

fn print_line<E: Serialize, P: Serialize>(channel: &'static str, event: E, payload: &P) {
    match serde_json::to_string(&Line {
        channel,
        event,
        payload,
    }) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "failed to encode event"),
    }
}

fn subscribe_printer(bus: &EventBus, no_ticks: bool) {
    let tags: Vec<TimerEvent> = TimerEvent::ALL
        .into_iter()
        .filter(|e| !(no_ticks && *e == TimerEvent::Update))
        .collect();
    bus.timer.subscribe(&tags, |event, payload| {
        print_line("timer", event, payload);
        true
    });
    bus.session.subscribe(&SessionEvent::ALL, |event, payload| {
        print_line("session", event, payload);
        true
    });
}

pub fn run(args: RunArgs) -> CmdResult {
    if args.cycles == 0 {
        return Err("--cycles must be at least 1".into());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .enable_io()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, drive(args))
}

async fn drive(args: RunArgs) -> CmdResult {
    let bus = Rc::new(EventBus::new());
    let store = open_store(&bus)?;
    let _plugins = plugin_engine(&bus, &store)?;

    subscribe_printer(&bus, args.no_ticks);

    let timer = Timer::new(Rc::clone(&bus), Rc::new(TokioScheduler));
    let session = Session::new(timer, Rc::clone(&bus), store)?;
    if let Some(session_type) = args.session {
        session.change(session_type)?;
    }

    let ended = Rc::new(Notify::new());
    let notify = Rc::clone(&ended);
    bus.session.subscribe(&[SessionEvent::End], move |_, _| {
        notify.notify_one();
        true
    });

    for cycle in 1..=args.cycles {
        session.start()?;
        tracing::info!(cycle, session = %session.current(), "session started");

        tokio::select! {
            _ = ended.notified() => {}
            _ = tokio::signal::ctrl_c() => {
                session.stop();
                tracing::info!("interrupted");
                break;
            }
        }
    }
    Ok(())
}

// ABOUTME: End-to-end tests of Bot::run with scripted backends
// ABOUTME: Covers dispatch, command routing, failure isolation, abort paths and shutdown policy

use abot_core::testing::{
    test_config, MockChannel, MockEntity, MockEvent, RecordingHandler, RecordingHooks,
    ScriptedBackend,
};
use abot_core::{
    find_abort, Abort, Bot, BotConfig, BotState, Command, CommandGroup, CommandSpec, Context,
    EventKind, Interest, ShutdownPolicy,
};
use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn joined(id: &str) -> MockEvent {
    MockEvent::new(id, EventKind::MemberJoined)
}

fn left(id: &str) -> MockEvent {
    MockEvent::new(id, EventKind::MemberLeft)
}

#[derive(Default)]
struct PingCommands {
    executed: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandGroup for PingCommands {
    fn name(&self) -> &str {
        "ping"
    }

    fn commands(&self) -> &[CommandSpec] {
        &[CommandSpec {
            name: "ping",
            help: "Check the bot is alive",
        }]
    }

    async fn execute(&self, command: &Command, ctx: &Context) -> Result<()> {
        self.executed.lock().unwrap().push(command.name.clone());
        ctx.reply("pong").await
    }
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_explicit_kinds_receive_only_those_kinds() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "hello"))
        .emit(joined("j1"))
        .emit(MockEvent::new("p1", EventKind::ChannelPost))
        .emit(left("l1"))
        .build();
    let membership = Arc::new(RecordingHandler::new(
        "membership",
        Interest::none(),
    ));

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_event_handler(
        [EventKind::MemberJoined, EventKind::MemberLeft],
        membership.clone(),
    )
    .unwrap();

    bot.run().await.unwrap();

    let mut seen = membership.seen();
    seen.sort();
    assert_eq!(seen, vec!["j1", "l1"]);
}

#[tokio::test]
async fn test_union_interest_handler_gets_every_member() {
    let backend = ScriptedBackend::new("mock")
        .emit(joined("j1"))
        .emit(left("l1"))
        .emit(MockEvent::message("m1", "hello"))
        .build();
    let membership = Arc::new(RecordingHandler::new(
        "membership",
        Interest::of(EventKind::MemberJoined).or(EventKind::MemberLeft),
    ));

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(membership.clone()).unwrap();
    bot.run().await.unwrap();

    assert_eq!(membership.count(), 2);
}

#[tokio::test]
async fn test_base_kind_handler_receives_derived_events() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "hello"))
        .emit(MockEvent::new("c1", EventKind::Command).with_text("/start"))
        .emit(joined("j1"))
        .build();
    let messages = Arc::new(RecordingHandler::new("messages", EventKind::Message));
    let everything = Arc::new(RecordingHandler::new("everything", EventKind::Event));

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(messages.clone()).unwrap();
    bot.add_handler(everything.clone()).unwrap();
    bot.run().await.unwrap();

    let mut seen = messages.seen();
    seen.sort();
    assert_eq!(seen, vec!["c1", "m1"]);
    assert_eq!(everything.count(), 3);
}

#[tokio::test]
async fn test_duplicate_registration_dispatches_once() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "hello"))
        .emit(MockEvent::message("m2", "again"))
        .build();
    let handler = Arc::new(RecordingHandler::new("dup", EventKind::Message));

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_event_handler(EventKind::Message, handler.clone())
        .unwrap();
    bot.add_event_handler(EventKind::Message, handler.clone())
        .unwrap();
    bot.add_event_handler(EventKind::Event, handler.clone())
        .unwrap();
    bot.run().await.unwrap();

    assert_eq!(handler.count(), 2);
}

#[tokio::test]
async fn test_events_without_handlers_are_ignored() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::new("x", EventKind::Custom("reaction")))
        .build();

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.run().await.unwrap();
}

#[tokio::test]
async fn test_closure_handler_via_on() {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend::new("mock")
        .emit(joined("j1"))
        .emit(joined("j2"))
        .build();

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    let counter = calls.clone();
    bot.on("greeter", EventKind::MemberJoined, move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
    .unwrap();
    bot.run().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Mention routing
// =============================================================================

#[tokio::test]
async fn test_mention_routes_to_command_group_once() {
    let channel = Arc::new(MockChannel::new("room"));
    let alice = Arc::new(MockEntity::new("alice"));
    let backend = ScriptedBackend::new("mock")
        .username("abot")
        .emit(
            MockEvent::message("m1", "@abot ping")
                .sent_by(alice)
                .in_channel(channel.clone()),
        )
        .build();
    let commands = Arc::new(PingCommands::default());
    let messages = Arc::new(RecordingHandler::new("messages", EventKind::Message));
    let everything = Arc::new(RecordingHandler::new("everything", EventKind::Event));

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.attach_command_group(commands.clone());
    bot.add_handler(messages.clone()).unwrap();
    bot.add_handler(everything.clone()).unwrap();
    bot.run().await.unwrap();

    assert_eq!(*commands.executed.lock().unwrap(), vec!["ping"]);
    assert_eq!(channel.said(), vec!["@alice: pong"]);
    assert_eq!(messages.mentions(), vec![Some("abot".to_string())]);
    assert_eq!(everything.count(), 1);
}

#[tokio::test]
async fn test_unmentioned_message_skips_commands() {
    let backend = ScriptedBackend::new("mock")
        .username("abot")
        .emit(MockEvent::message("m1", "ping"))
        .emit(MockEvent::message("m2", "abotping"))
        .emit(joined("j1"))
        .build();
    let commands = Arc::new(PingCommands::default());

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.attach_command_group(commands.clone());
    bot.run().await.unwrap();

    assert!(commands.executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_command_gets_reply() {
    let channel = Arc::new(MockChannel::new("room"));
    let backend = ScriptedBackend::new("mock")
        .username("abot")
        .emit(MockEvent::message("m1", "abot: dance").in_channel(channel.clone()))
        .build();
    let commands = Arc::new(PingCommands::default());

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.attach_command_group(commands.clone());
    bot.run().await.unwrap();

    assert!(commands.executed.lock().unwrap().is_empty());
    let said = channel.said();
    assert_eq!(said.len(), 1);
    assert!(said[0].starts_with("Unknown command: dance"));
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn test_failing_backend_restarts_without_disturbing_sibling() {
    let flaky = ScriptedBackend::new("flaky")
        .emit(MockEvent::message("a1", "x"))
        .fail("connection reset")
        .emit(MockEvent::message("a2", "x"))
        .build();
    let steady = ScriptedBackend::new("steady")
        .emit(MockEvent::message("b1", "x"))
        .emit(MockEvent::message("b2", "x"))
        .build();
    let handler = Arc::new(RecordingHandler::new("all", EventKind::Message));
    let hooks = Arc::new(RecordingHooks::new());

    let mut bot = Bot::new(test_config()).with_hooks(hooks.clone());
    bot.attach_backend(Arc::new(flaky)).unwrap();
    bot.attach_backend(Arc::new(steady)).unwrap();
    bot.add_handler(handler.clone()).unwrap();
    bot.run().await.unwrap();

    let mut seen = handler.seen();
    seen.sort();
    assert_eq!(seen, vec!["a1", "a2", "b1", "b2"]);
    assert!(hooks.internal_errors().is_empty());
}

#[tokio::test]
async fn test_handler_error_is_reported_and_swallowed() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .emit(MockEvent::message("m2", "x"))
        .build();
    let failing = Arc::new(RecordingHandler::new("failing", EventKind::Message).failing("nope"));
    let healthy = Arc::new(RecordingHandler::new("healthy", EventKind::Message));
    let hooks = Arc::new(RecordingHooks::new());

    let mut bot = Bot::new(test_config()).with_hooks(hooks.clone());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(failing.clone()).unwrap();
    bot.add_handler(healthy.clone()).unwrap();
    bot.run().await.unwrap();

    assert_eq!(healthy.count(), 2);
    let failures = hooks.handler_failures();
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|(handler, error)| handler == "failing" && error == "nope"));
}

#[tokio::test]
async fn test_gave_up_backend_consults_internal_exception_and_continues() {
    let mut config = test_config();
    config.supervisor.backoff.max_retries = 1;

    let broken = ScriptedBackend::new("broken")
        .fail("one")
        .fail("two")
        .build();
    let steady = ScriptedBackend::new("steady")
        .emit(MockEvent::message("s1", "x"))
        .build();
    let handler = Arc::new(RecordingHandler::new("all", EventKind::Message));
    let hooks = Arc::new(RecordingHooks::new());

    let mut bot = Bot::new(config).with_hooks(hooks.clone());
    bot.attach_backend(Arc::new(broken)).unwrap();
    bot.attach_backend(Arc::new(steady)).unwrap();
    bot.add_handler(handler.clone()).unwrap();
    bot.run().await.unwrap();

    let errors = hooks.internal_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("backend 'broken' gave up"));
    assert_eq!(handler.seen(), vec!["s1"]);
}

#[tokio::test]
async fn test_internal_exception_hook_can_stop_the_bot() {
    let mut config = test_config();
    config.supervisor.backoff.max_retries = 1;

    let broken = ScriptedBackend::new("broken")
        .fail("one")
        .fail("two")
        .build();
    let idle = ScriptedBackend::new("idle").pending().build();
    let hooks = Arc::new(RecordingHooks::stopping());

    let mut bot = Bot::new(config).with_hooks(hooks.clone());
    let handle = bot.handle();
    bot.attach_backend(Arc::new(broken)).unwrap();
    bot.attach_backend(Arc::new(idle)).unwrap();

    bot.run().await.unwrap();
    assert_eq!(hooks.internal_errors().len(), 1);
    assert_eq!(handle.state(), BotState::Stopped);
}

// =============================================================================
// Abort
// =============================================================================

#[tokio::test]
async fn test_backend_abort_fails_run() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .abort("account banned")
        .emit(MockEvent::message("never", "x"))
        .build();
    let other = ScriptedBackend::new("other").pending().build();

    let mut bot = Bot::new(test_config());
    let handle = bot.handle();
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.attach_backend(Arc::new(other)).unwrap();

    let err = bot.run().await.unwrap_err();
    assert_eq!(find_abort(&err).map(|a| a.reason()), Some("account banned"));
    assert_eq!(handle.state(), BotState::Aborted);
}

#[tokio::test]
async fn test_handler_abort_fails_run_with_events_in_flight() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .emit(MockEvent::message("m2", "x"))
        .emit(joined("j1"))
        .pending()
        .build();
    let hanging = Arc::new(RecordingHandler::new("hanging", EventKind::Message).hanging());
    let killer = Arc::new(
        RecordingHandler::new("killer", EventKind::MemberJoined).aborting("enough"),
    );

    let mut bot = Bot::new(test_config());
    let handle = bot.handle();
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(hanging.clone()).unwrap();
    bot.add_handler(killer.clone()).unwrap();

    let err = bot.run().await.unwrap_err();
    assert_eq!(find_abort(&err).map(|a| a.reason()), Some("enough"));
    assert_eq!(killer.seen(), vec!["j1"]);
    assert_eq!(handle.state(), BotState::Aborted);
}

#[tokio::test]
async fn test_abort_through_handle_stops_running_bot() {
    let backend = ScriptedBackend::new("idle").pending().build();
    let mut bot = Bot::new(test_config());
    let handle = bot.handle();
    bot.attach_backend(Arc::new(backend)).unwrap();

    let running = bot.start();
    assert_eq!(
        handle.wait_until(|s| s == BotState::Running).await,
        BotState::Running
    );
    assert!(handle.abort(Abort::new("operator")));

    let err = running.await.unwrap().unwrap_err();
    assert_eq!(find_abort(&err).map(|a| a.reason()), Some("operator"));
    assert_eq!(handle.state(), BotState::Aborted);
}

#[tokio::test]
async fn test_aborting_closure_through_context() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "shutdown"))
        .pending()
        .build();
    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.on("stopper", EventKind::Message, |ctx| async move {
        if ctx.text() == "shutdown" {
            ctx.abort("asked to stop");
        }
        Ok(())
    })
    .unwrap();

    let err = bot.run().await.unwrap_err();
    assert_eq!(find_abort(&err).map(|a| a.reason()), Some("asked to stop"));
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn test_initialize_failure_aborts_startup() {
    let good = Arc::new(ScriptedBackend::new("good").build());
    let bad = Arc::new(
        ScriptedBackend::new("bad")
            .fail_initialize("invalid token")
            .build(),
    );
    let later = Arc::new(ScriptedBackend::new("later").build());

    let mut bot = Bot::new(test_config());
    let handle = bot.handle();
    bot.attach_backend(good.clone()).unwrap();
    bot.attach_backend(bad.clone()).unwrap();
    bot.attach_backend(later.clone()).unwrap();

    let err = bot.run().await.unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("backend 'bad' failed to initialize"), "{}", message);
    assert!(message.contains("invalid token"), "{}", message);
    assert!(find_abort(&err).is_none());

    assert_eq!(good.initialize_calls(), 1);
    assert_eq!(later.initialize_calls(), 0);
    assert_eq!(good.consume_calls(), 0);
    assert_eq!(handle.state(), BotState::Stopped);
}

#[tokio::test]
async fn test_attaching_same_backend_twice_is_an_error() {
    let backend: Arc<dyn abot_core::Backend> = Arc::new(ScriptedBackend::new("mock").build());
    let mut bot = Bot::new(BotConfig::default());
    bot.attach_backend(backend.clone()).unwrap();
    assert!(bot.attach_backend(backend).is_err());
}

// =============================================================================
// Shutdown policy
// =============================================================================

fn finishing_handler(
    done: Arc<AtomicUsize>,
) -> impl Fn(Context) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static {
    move |_ctx| {
        let done = done.clone();
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_drain_waits_for_in_flight_handlers() {
    let done = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .build();

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.on("slow", EventKind::Message, finishing_handler(done.clone()))
        .unwrap();
    bot.run().await.unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandon_cancels_in_flight_handlers_when_hooks_stop() {
    let done = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .fail("one")
        .fail("two")
        .build();
    let mut config = test_config();
    config.shutdown.policy = ShutdownPolicy::Abandon;
    config.supervisor.backoff.max_retries = 1;
    let hooks = Arc::new(RecordingHooks::stopping());

    let mut bot = Bot::new(config).with_hooks(hooks.clone());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.on("slow", EventKind::Message, finishing_handler(done.clone()))
        .unwrap();
    bot.run().await.unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(hooks.internal_errors().len(), 1);
    assert_eq!(done.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_streams_wait_for_handlers_under_abandon() {
    let done = Arc::new(AtomicUsize::new(0));
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .build();
    let mut config = test_config();
    config.shutdown.policy = ShutdownPolicy::Abandon;

    let mut bot = Bot::new(config);
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.on("slow", EventKind::Message, finishing_handler(done.clone()))
        .unwrap();
    bot.run().await.unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drain_gives_up_after_timeout() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .build();
    let hanging = Arc::new(RecordingHandler::new("hanging", EventKind::Message).hanging());
    let mut config = test_config();
    config.shutdown.drain_timeout_ms = 1_000;

    let mut bot = Bot::new(config);
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(hanging.clone()).unwrap();

    let started = tokio::time::Instant::now();
    bot.run().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(1_000));
    assert_eq!(hanging.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_while_draining_fails_run() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("m1", "x"))
        .build();
    let late_abort = Arc::new(
        RecordingHandler::new("late", EventKind::Message)
            .with_delay(Duration::from_millis(50))
            .aborting("too late to stop"),
    );

    let mut bot = Bot::new(test_config());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(late_abort).unwrap();

    let err = bot.run().await.unwrap_err();
    assert_eq!(
        find_abort(&err).map(|a| a.reason()),
        Some("too late to stop")
    );
}

// =============================================================================
// Default configuration
// =============================================================================

#[tokio::test]
async fn test_default_config_handles_final_event() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("last", "x"))
        .build();
    let handler = Arc::new(RecordingHandler::new("messages", EventKind::Message));

    let mut bot = Bot::new(BotConfig::default());
    let handle = bot.handle();
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(handler.clone()).unwrap();
    bot.run().await.unwrap();

    assert_eq!(handler.seen(), vec!["last"]);
    assert_eq!(handle.state(), BotState::Stopped);
}

#[tokio::test]
async fn test_default_config_abort_on_final_event_fails_run() {
    let backend = ScriptedBackend::new("mock")
        .emit(MockEvent::message("last", "x"))
        .build();
    let stopper = Arc::new(RecordingHandler::new("stopper", EventKind::Message).aborting("stop"));

    let mut bot = Bot::new(BotConfig::default());
    let handle = bot.handle();
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.add_handler(stopper.clone()).unwrap();

    let err = bot.run().await.unwrap_err();
    assert_eq!(find_abort(&err).map(|a| a.reason()), Some("stop"));
    assert_eq!(stopper.seen(), vec!["last"]);
    assert_eq!(handle.state(), BotState::Aborted);
}

#[tokio::test]
async fn test_default_config_answers_command_on_final_event() {
    let channel = Arc::new(MockChannel::new("room"));
    let backend = ScriptedBackend::new("mock")
        .username("abot")
        .emit(
            MockEvent::message("last", "@abot ping")
                .sent_by(Arc::new(MockEntity::new("alice")))
                .in_channel(channel.clone()),
        )
        .build();
    let commands = Arc::new(PingCommands::default());

    let mut bot = Bot::new(BotConfig::default());
    bot.attach_backend(Arc::new(backend)).unwrap();
    bot.attach_command_group(commands.clone());
    bot.run().await.unwrap();

    assert_eq!(*commands.executed.lock().unwrap(), vec!["ping"]);
    assert_eq!(channel.said(), vec!["@alice: pong"]);
}

#[tokio::test(flavor = "current_thread")]
async fn test_instantly_failing_backend_does_not_starve_the_loop() {
    let broken = ScriptedBackend::new("broken").fail_forever("refused").build();
    let mut bot = Bot::new(test_config());
    let handle = bot.handle();
    bot.attach_backend(Arc::new(broken)).unwrap();

    let running = bot.start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handle.abort(Abort::new("enough")));

    let err = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run loop was starved")
        .unwrap()
        .unwrap_err();
    assert_eq!(find_abort(&err).map(|a| a.reason()), Some("enough"));
}

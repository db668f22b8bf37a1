mod common;

use std::io::Write;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use fieldlog::{
    backend::{
        Backend, BackendError,
        buffer::{BufferConfig, Buffered},
        filter::Filter,
        multi::Multi,
        outer::OuterLog,
        store_sink::{StoreSink, decode_stored, timestamp_key},
        writer::Writer,
    },
    failure::{self, FailureReport},
    format::{FormatError, Formatter, TemplateFormatter},
    logger::Logger,
    record::Entry,
    rule::{Operator, Rule},
    store::{Storer, StorerExt, memory::MapStore},
    types::Level,
};

use common::{Collector, entry};

fn msg_formatter() -> Arc<dyn Formatter<Entry>> {
    Arc::new(TemplateFormatter::new("::", "::msg").expect("formatter"))
}

#[tokio::test]
async fn fan_out_respects_top_level_filter() {
    let a = Collector::new();
    let b = Collector::new();
    let multi = Multi::new(vec![
        (Box::new(a.clone()) as Box<dyn Backend<Entry>>, msg_formatter()),
        (Box::new(b.clone()) as Box<dyn Backend<Entry>>, msg_formatter()),
    ]);
    multi.set_filter(Rule::not(Rule::compare(Operator::Contains, "msg", "skip")));

    multi.commit(entry(Level::Info, "keep")).await;
    multi.commit(entry(Level::Info, "skip me")).await;

    assert_eq!(a.messages(), ["keep"]);
    assert_eq!(b.messages(), ["keep"]);
    assert!(a.formatter().is_some());
    assert!(multi.formatter().is_some());

    multi.close().await.expect("close");
    assert_eq!((a.closes(), b.closes()), (1, 1));
}

#[tokio::test]
async fn stacked_filters_and_their_rules() {
    let sink = Collector::new();
    let inner = Filter::<Entry>::new(sink.clone(), Rule::compare(Operator::Ge, "level", Level::Warn));
    let outer = Filter::<Entry>::new(inner, Rule::compare(Operator::Prefix, "msg", "db"));

    for (level, msg) in [
        (Level::Error, "db down"),
        (Level::Info, "db slow"),
        (Level::Error, "net down"),
        (Level::Warn, "db retry"),
    ] {
        outer.commit(entry(level, msg)).await;
    }
    assert_eq!(sink.messages(), ["db down", "db retry"]);

    outer.set_formatter(msg_formatter());
    assert!(sink.formatter().is_some());
}

#[tokio::test]
async fn buffer_delivers_every_commit_in_order_before_close_returns() {
    let sink = Collector::slow(Duration::from_millis(1));
    let buffered = Buffered::<Entry>::spawn(sink.clone(), BufferConfig { capacity: 4 });

    let k = 50;
    for i in 0..k {
        buffered.commit(entry(Level::Info, &format!("m{i}"))).await;
    }
    buffered.close().await.expect("close");

    let want: Vec<String> = (0..k).map(|i| format!("m{i}")).collect();
    assert_eq!(sink.messages(), want);
    assert_eq!(sink.closes(), 0, "buffer close leaves the wrapped backend open");

    buffered.close().await.expect("second close is a no-op");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn buffer_keeps_each_producers_order() {
    let sink = Collector::new();
    let buffered = Arc::new(Buffered::<Entry>::spawn(sink.clone(), BufferConfig { capacity: 8 }));

    let mut tasks = Vec::new();
    for p in 0..4 {
        let buffered = Arc::clone(&buffered);
        tasks.push(tokio::spawn(async move {
            for i in 0..25 {
                buffered.commit(entry(Level::Info, &format!("{p}:{i}"))).await;
            }
        }));
    }
    for task in tasks {
        task.await.expect("producer");
    }
    buffered.close().await.expect("close");

    let seen = sink.messages();
    assert_eq!(seen.len(), 100);
    for p in 0..4 {
        let mine: Vec<u32> = seen
            .iter()
            .filter_map(|m| m.strip_prefix(&format!("{p}:")).map(|i| i.parse().expect("index")))
            .collect();
        assert_eq!(mine, (0..25).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn buffer_filter_and_formatter_access() {
    let sink = Collector::new();
    let buffered = Buffered::<Entry>::spawn(sink.clone(), BufferConfig::default());
    buffered.set_filter(Rule::compare(Operator::Ge, "level", Level::Error));
    buffered.set_formatter(msg_formatter());

    buffered.commit(entry(Level::Info, "quiet")).await;
    buffered.commit(entry(Level::Fatal, "loud")).await;
    buffered.close().await.expect("close");

    assert_eq!(sink.messages(), ["loud"]);
    assert!(buffered.formatter().is_some());
}

#[tokio::test]
async fn failures_reach_the_installed_hook() {
    let rejected = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&rejected);
    failure::set_failure_hook(move |report: &FailureReport| {
        if report.record.as_ref().is_some_and(|r| r.message.starts_with("hook-test")) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    // Commit after close.
    let buffered = Buffered::<Entry>::spawn(Collector::new(), BufferConfig::default());
    buffered.close().await.expect("close");
    buffered.commit(entry(Level::Info, "hook-test closed")).await;

    // Rule that cannot be evaluated.
    let sink = Collector::new();
    let filter = Filter::<Entry>::new(sink.clone(), Rule::compare(Operator::Eq, "no_such_field", "x"));
    filter.commit(entry(Level::Info, "hook-test rule")).await;

    // Sink without a formatter.
    let writer = Writer::<Vec<u8>, Entry>::new(Vec::new());
    writer.commit(entry(Level::Info, "hook-test formatter")).await;

    failure::reset_failure_hook();

    assert_eq!(rejected.load(Ordering::SeqCst), 3);
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn writer_terminates_each_line() {
    let writer = Writer::with_formatter(Vec::new(), msg_formatter());
    writer.commit(entry(Level::Info, "one")).await;
    writer.commit(entry(Level::Info, "two")).await;
    writer.close().await.expect("flush");

    let out = writer.replace_output(Vec::new());
    assert_eq!(String::from_utf8(out).expect("utf8"), "one\ntwo\n");
}

#[tokio::test]
async fn bridge_commits_every_line_written_before_close() {
    let sink = Collector::new();
    let bridge = OuterLog::<Entry>::new(sink.clone(), Level::Warn, "thirdparty");

    let mut w1 = bridge.writer();
    let mut w2 = bridge.writer();
    w1.write_all(b"first line\nsecond ").expect("write");
    w1.write_all(b"line\r\nthird line\n").expect("write");
    w2.write_all(b"from w2\npartial").expect("write");

    bridge.close().await.expect("close");

    let entries = sink.entries();
    let msgs: Vec<&str> = entries.iter().map(|e| e.msg.as_str()).collect();
    assert_eq!(msgs, ["first line", "second line", "third line", "from w2"]);
    for e in &entries {
        assert_eq!(e.level, Level::Warn);
        assert!(e.tags.contains("outer"));
        assert!(e.tags.contains("thirdparty"));
    }

    let err = w1.write_all(b"late\n").expect_err("closed bridge");
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    assert!(matches!(bridge.close().await, Err(BackendError::AlreadyClosed)));
}

#[tokio::test]
async fn closing_an_unstarted_bridge_fails() {
    let bridge = OuterLog::<Entry>::new(Collector::new(), Level::Info, "x");
    assert!(matches!(bridge.close().await, Err(BackendError::AlreadyClosed)));
}

#[tokio::test]
async fn store_sink_iterates_chronologically() {
    let store: Arc<dyn Storer> = Arc::new(MapStore::new());
    let sink = StoreSink::<Entry>::new(Arc::clone(&store));
    sink.set_formatter(Arc::new(TemplateFormatter::new("::", "::level ::msg").expect("formatter")));

    let base = Utc.with_ymd_and_hms(2023, 7, 1, 12, 0, 0).unwrap();
    for (offset_ms, msg) in [(900, "late"), (0, "early"), (450, "middle")] {
        let mut e = Entry::new(Level::Info, msg);
        e.date = base + chrono::Duration::milliseconds(offset_ms);
        sink.commit(Arc::new(e)).await;
    }

    let stored = store
        .view(|tx| {
            let mut cur = tx.cursor();
            let mut out = Vec::new();
            let mut next = cur.first()?;
            while let Some((key, value)) = next {
                out.push((key, value));
                next = cur.next()?;
            }
            Ok(out)
        })
        .expect("scan");

    let msgs: Vec<String> = stored
        .iter()
        .map(|(_, v)| decode_stored::<Entry>(v).expect("decode").record.msg)
        .collect();
    assert_eq!(msgs, ["early", "middle", "late"]);

    let (first_key, first_value) = &stored[0];
    assert_eq!(first_key, &timestamp_key(base));
    let decoded = decode_stored::<Entry>(first_value).expect("decode");
    assert_eq!(decoded.rendered, "info early");
    assert_eq!(decoded.record.date, base);

    sink.close().await.expect("close");
}

#[tokio::test]
async fn store_sink_without_formatter_writes_nothing() {
    let store = Arc::new(MapStore::new());
    let sink = StoreSink::<Entry>::new(store.clone());
    sink.commit(entry(Level::Info, "unformatted")).await;
    assert_eq!(store.len().expect("len"), 0);
}

#[tokio::test]
async fn logger_levels_gate_by_scope() {
    let sink = Collector::new();
    let log = Logger::new(sink.clone()).with_domain("api").with_tag("svc");
    log.set_level("all", Level::Warn);
    log.set_level("net", Level::Debug);

    let mut chatty = fieldlog::entry!(Level::Debug, "handshake");
    chatty.pkg = "net::tls".to_string();
    log.commit(chatty).await;
    log.info("ignored").await;
    log.error("kept").await;

    let seen = sink.entries();
    let msgs: Vec<&str> = seen.iter().map(|e| e.msg.as_str()).collect();
    assert_eq!(msgs, ["handshake", "kept"]);
    assert!(seen.iter().all(|e| e.domain == "api" && e.tags.contains("svc")));
    assert_eq!(seen[0].func, "logger_levels_gate_by_scope");

    log.close().await.expect("close");
    assert_eq!(sink.closes(), 1);
}

#[tokio::test]
async fn logger_level_does_not_replace_a_filter_rule() {
    let sink = Collector::new();
    let only_db = Filter::<Entry>::new(sink.clone(), Rule::compare(Operator::Prefix, "msg", "db"));
    let log = Logger::new(Arc::new(only_db));
    log.set_level("all", Level::Info);

    log.error("net down").await;
    log.error("db down").await;
    log.debug("db noise").await;

    assert_eq!(sink.messages(), ["db down"]);
    assert!(sink.has_filter());
}

#[tokio::test]
async fn level_policy_ands_with_a_buffered_filter_chain() {
    let sink = Collector::new();
    let chain = Buffered::<Entry>::spawn(
        Filter::<Entry>::new(sink.clone(), Rule::not(Rule::compare(Operator::Contains, "msg", "noise"))),
        BufferConfig::default(),
    );
    let log = Logger::new(Arc::new(chain));
    log.set_level("all", Level::Warn);

    log.warn("disk full").await;
    log.error("noise burst").await;
    log.info("disk ok").await;
    log.error("disk gone").await;
    log.close().await.expect("close");

    assert_eq!(sink.messages(), ["disk full", "disk gone"]);
    assert!(!sink.has_filter());
}

#[tokio::test]
async fn logger_template_reaches_an_installed_writer() {
    let writer = Arc::new(Writer::<Vec<u8>, Entry>::new(Vec::new()));
    let log = Logger::new(writer.clone());

    log.set_template("::", "::level ::msg").expect("template");
    log.error("boom").await;
    log.set_template("%", "-> %msg").expect("template");
    log.info("again").await;

    assert!(matches!(log.set_template("::", ""), Err(FormatError::InvalidTemplate)));
    log.close().await.expect("flush");
    let out = writer.replace_output(Vec::new());
    assert_eq!(String::from_utf8(out).expect("utf8"), "error boom\n-> again\n");
}

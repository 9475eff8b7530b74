mod log;

use crate::log::*;
use std::{sync::Arc, time::Duration};
use svcb_fallback_lib::*;

const CONFIG: &str = r#"
origin_fallback_allowed = true
fast_fallback_timeout_ms = 50
reset_exclusion_list_on_signal = true
attempt_timeout = "2s"
"#;

/// base64 of a dummy ECH config list
const ECH: &str = "AEX+DQBBcQAgACBSmG5t";

fn answers() -> anyhow::Result<Vec<(&'static str, Vec<SvcbAnswer>)>> {
  let shop = vec![
    SvcbAnswer::new("shop.example", 300, 1, Some("edge1.cdn.example"))
      .with_presentation_param("alpn", "h3,h2")?
      .with_presentation_param("ech", ECH)?,
    SvcbAnswer::new("shop.example", 300, 2, Some("edge2.cdn.example"))
      .with_presentation_param("alpn", "h2")?
      .with_presentation_param("ech", ECH)?,
  ];
  let blog = vec![
    SvcbAnswer::new("blog.example", 60, 1, Some("."))
      .with_presentation_param("alpn", "h3")?
      .with_presentation_param("no-default-alpn", "")?
      .with_presentation_param("port", "8443")?,
    SvcbAnswer::new("blog.example", 60, 2, Some("mirror.blog.example")).with_presentation_param("alpn", "h2")?,
  ];
  let vault = vec![
    SvcbAnswer::new("vault.example", 300, 1, Some("a.vault.example"))
      .with_presentation_param("alpn", "h2")?
      .with_presentation_param("ech", ECH)?,
    SvcbAnswer::new("vault.example", 300, 2, Some("b.vault.example"))
      .with_presentation_param("alpn", "h2")?
      .with_presentation_param("ech", ECH)?,
  ];
  Ok(vec![("shop.example", shop), ("blog.example", blog), ("vault.example", vault)])
}

fn report<T>(origin: &str, result: &Result<FallbackOutcome<T>, FallbackError>) {
  match result {
    Ok(outcome) => info!(
      "{} reached {} over {} after {} attempt(s)",
      origin,
      outcome.report.winner_name(),
      outcome.report.transport,
      outcome.report.attempted.len()
    ),
    Err(e) => {
      warn!("{}: {}", origin, e);
      for attempt in e.attempted() {
        warn!("  {}", attempt);
      }
    }
  }
}

fn main() -> anyhow::Result<()> {
  let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
  runtime_builder.enable_all();
  runtime_builder.thread_name("svcb-fallback");
  let runtime = runtime_builder.build()?;

  init_logger();

  runtime.block_on(async {
    let config = FallbackConfig::try_from(ConfigToml::parse(CONFIG)?)?;
    info!("Walkthrough with {:?}", config);

    let mut source = MockSvcbSource::new();
    for (origin, records) in answers()? {
      source.add_answers(origin, records);
    }
    let resolver = CachingSvcbResolver::new(source, &config);

    let connector = Arc::new(
      ScriptedConnector::new()
        // QUIC to edge1 stalls: its h2 transport takes over after the head start
        .with_script("edge1.cdn.example", Transport::Http3, Script::Hang)
        .with_script(
          "edge1.cdn.example",
          Transport::Http2,
          Script::Succeed {
            after: Duration::from_millis(20),
          },
        )
        // HTTP/3 on the blog's own name is refused, the mirror answers
        .with_script("blog.example", Transport::Http3, Script::fail("udp blocked"))
        .with_script("mirror.blog.example", Transport::Http2, Script::succeed())
        // the vault is down, and its plain address would be reachable
        .with_script("vault.example", Transport::Plain, Script::succeed()),
    );
    let orchestrator = FallbackOrchestrator::new(connector.clone(), config);

    for origin in ["shop.example", "blog.example", "vault.example"] {
      let result = orchestrator.connect_to(&resolver, origin).await;
      report(origin, &result);
    }

    // vault endpoints stay excluded until the exclusion list is reset
    connector.set_script("b.vault.example", Transport::Http2, Script::succeed());
    let result = orchestrator.connect_to(&resolver, "vault.example").await;
    report("vault.example", &result);

    orchestrator.handle_reset_signal(ResetSignal::OperatorRequest);
    resolver.handle_reset_signal(ResetSignal::OperatorRequest);
    let result = orchestrator.connect_to(&resolver, "vault.example").await;
    report("vault.example", &result);

    info!("{:?}", resolver.cache().stats());
    Ok::<(), anyhow::Error>(())
  })
}

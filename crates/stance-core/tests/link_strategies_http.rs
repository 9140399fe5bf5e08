//! Seq2seq and reasoning-mode links against a scripted completions server.

use serde_json::{json, Value};
use stance_core::config::{ChainConfig, LinkSpec};
use stance_core::engine::ChainOrchestrator;
use stance_core::model::{LinkMode, LinkStrategy, Record};
use stance_core::providers::ModelCache;
use stance_core::storage::ResultStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const MODEL: &str = "google/flan-t5-small";
const RATIONALE: &str = "The author sounds pleased.";

/// Answers like an OpenAI-compatible server: echo calls get per-token
/// logprobs with character offsets, logprob calls get a scored first token,
/// plain calls get greedy text. Records mentioning "Café" are FOR, the rest
/// AGAINST.
struct ScriptedCompletions;

fn stance_of(prompt: &str) -> &'static str {
    if prompt.contains("Café") {
        "FOR"
    } else {
        "AGAINST"
    }
}

fn echo_choice(index: usize, prompt: &str) -> Value {
    let (head, label) = prompt.rsplit_once(' ').unwrap_or((prompt, ""));
    let lp = if label.eq_ignore_ascii_case(stance_of(head)) {
        -0.2
    } else {
        -2.5
    };
    json!({
        "index": index,
        "text": prompt,
        "logprobs": {
            "tokens": [head, format!(" {}", label)],
            "token_logprobs": [null, lp],
            "top_logprobs": [null, null],
            "text_offset": [0, head.chars().count()]
        }
    })
}

fn scored_choice(index: usize, prompt: &str) -> Value {
    let (win, lose) = match stance_of(prompt) {
        "FOR" => (" FOR", " AGAINST"),
        _ => (" AGAINST", " FOR"),
    };
    let mut top = serde_json::Map::new();
    top.insert(win.to_string(), json!(-0.1));
    top.insert(lose.to_string(), json!(-2.6));
    json!({
        "index": index,
        "text": win,
        "logprobs": {
            "tokens": [win],
            "token_logprobs": [-0.1],
            "top_logprobs": [top],
            "text_offset": [prompt.chars().count()]
        }
    })
}

fn greedy_choice(index: usize, prompt: &str) -> Value {
    let text = if prompt.ends_with("step by step.") {
        format!(" {}", RATIONALE)
    } else {
        format!(" {}", stance_of(prompt))
    };
    json!({"index": index, "text": text})
}

impl Respond for ScriptedCompletions {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = request.body_json::<Value>() else {
            return ResponseTemplate::new(400);
        };
        let prompts: Vec<&str> = body["prompt"]
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let echo = body["echo"].as_bool().unwrap_or(false);
        let scored = body.get("logprobs").is_some();
        let choices: Vec<Value> = prompts
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if echo {
                    echo_choice(i, p)
                } else if scored {
                    scored_choice(i, p)
                } else {
                    greedy_choice(i, p)
                }
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "choices": choices }))
    }
}

async fn server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": MODEL}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/completions"))
        .respond_with(ScriptedCompletions)
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer, spec: LinkSpec) -> ChainConfig {
    let mut cfg = ChainConfig::new(vec![spec]);
    cfg.provider.base_url = server.uri();
    cfg
}

async fn completion_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/completions")
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

fn records() -> Vec<Record> {
    vec![
        Record::new("Café 🌍 rocks, more bike lanes please!", "cycling infrastructure"),
        Record::new("Another lane closed for bikes, great.", "cycling infrastructure"),
    ]
}

#[tokio::test]
async fn seq2seq_chain_scores_every_label_by_likelihood() {
    let server = server().await;
    let cfg = config(
        &server,
        LinkSpec::new(MODEL).with_strategy(LinkStrategy::Seq2seq),
    );
    let chain = ChainOrchestrator::from_config(&cfg, &ModelCache::new())
        .await
        .expect("chain builds");
    let rs = ResultStore::memory().unwrap();
    let out = chain.run(&records(), &rs).await.expect("batch runs");

    // The non-ASCII record scores like any other.
    assert_eq!(out.rows[0].pred_label, "for");
    assert_eq!(out.rows[0].raw_pred_label, "FOR");
    assert!(out.rows[0].conf_score > 0.8);
    assert!(out.rows[0].history[0].error.is_none());
    assert_eq!(out.rows[1].pred_label, "against");
    assert_eq!(out.rows[1].raw_pred_label, "AGAINST");

    // One greedy call, then one echo call per label.
    let bodies = completion_bodies(&server).await;
    assert_eq!(bodies.len(), 4);
    let echoed: Vec<&Value> = bodies.iter().filter(|b| b["echo"] == json!(true)).collect();
    assert_eq!(echoed.len(), 3);
    for (body, label) in echoed.iter().zip(["for", "against", "neutral"]) {
        assert_eq!(body["max_tokens"], json!(0));
        let prompts = body["prompt"].as_array().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].as_str().unwrap().ends_with(&format!(" {}", label)));
    }
}

#[tokio::test]
async fn reasoning_mode_scores_after_the_rationale() {
    let server = server().await;
    let cfg = config(
        &server,
        LinkSpec::new(MODEL)
            .with_strategy(LinkStrategy::Causal)
            .with_mode(LinkMode::Reasoning),
    );
    let chain = ChainOrchestrator::from_config(&cfg, &ModelCache::new())
        .await
        .expect("chain builds");
    let rs = ResultStore::memory().unwrap();
    let out = chain.run(&records(), &rs).await.expect("batch runs");

    assert_eq!(out.rows[0].pred_label, "for");
    assert_eq!(out.rows[1].pred_label, "against");

    let bodies = completion_bodies(&server).await;
    assert_eq!(bodies.len(), 2);

    let rationale = &bodies[0];
    assert!(rationale.get("logprobs").is_none());
    for p in rationale["prompt"].as_array().unwrap() {
        assert!(p.as_str().unwrap().ends_with("\nLet's think step by step."));
    }

    let scoring = &bodies[1];
    assert_eq!(scoring["logprobs"], json!(20));
    for p in scoring["prompt"].as_array().unwrap() {
        let p = p.as_str().unwrap();
        assert!(p.contains(RATIONALE));
        assert!(p.ends_with("\nAnswer:"));
    }
}

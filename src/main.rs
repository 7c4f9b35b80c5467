//! SpeakFluent - 控制台口语练习
//!
//! 入口：初始化日志、构建编排器，开始一次会话并逐行读取候选人回答。
//! `/cue` 生成 Part 2 话题卡，`/end` 评分并打印报告，`/quit` 直接退出。
//! 参数：`speakfluent [user_id] [practice|mock|exam]`

use anyhow::Context;
use serde_json::json;
use speakfluent::{observability, OrchestratorBuilder, SessionType};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let user_id = args.next().unwrap_or_else(|| "1".to_string());
    let session_type: SessionType = match args.next() {
        Some(s) => s.parse().context("Invalid session type")?,
        None => SessionType::Practice,
    };

    let orchestrator = OrchestratorBuilder::from_config_path(None).build();
    let profile = json!({ "user_id": user_id });

    let start = orchestrator
        .start_speaking_session(&user_id, &profile, session_type)
        .await
        .context("Failed to start session")?;
    println!("{}", start.motivation.message);
    println!("\n[Part {}] Examiner: {}", start.part, start.first_question);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => return Ok(()),
            "/cue" => {
                let card = orchestrator.generate_cue_card(&profile).await.into_inner();
                println!("{}", serde_json::to_string_pretty(&card)?);
            }
            "/end" => break,
            answer => {
                let turn = orchestrator
                    .process_user_response(&start.session_id, answer, &json!({}))
                    .await
                    .context("Failed to process response")?;
                for tip in &turn.confidence_tips {
                    println!("  tip: {}", tip);
                }
                println!("\n[Part {}] Examiner: {}", turn.part, turn.next_question);
            }
        }
    }

    let session = orchestrator.session(&start.session_id).await?;
    let report = orchestrator
        .end_session_and_score(&start.session_id, &session.transcript(), &json!({}))
        .await
        .context("Failed to score session")?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

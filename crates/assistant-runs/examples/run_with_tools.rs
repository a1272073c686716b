use std::time::Duration;

use assistant_runs::prelude::*;

fn answer(run: &Run, action: &RequiredAction) -> Vec<ToolOutput> {
    action
        .tool_calls()
        .iter()
        .map(|call| {
            println!(
                "run {} asks for {}({})",
                run.id, call.function.name, call.function.arguments
            );
            let output = match call.function.name.as_str() {
                "get_time" => serde_json::json!({"utc": "2024-01-01T00:00:00Z"}),
                other => serde_json::json!({"error": format!("unknown tool {other}")}),
            };
            ToolOutput::new(&call.id, output.to_string())
        })
        .collect()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    assistant_runs::init_observability();

    let thread_id = std::env::var("THREAD_ID")
        .map_err(|_| ClientError::Config("set THREAD_ID to an existing thread".into()))?;
    let assistant_id = std::env::var("ASSISTANT_ID")
        .map_err(|_| ClientError::Config("set ASSISTANT_ID to an existing assistant".into()))?;

    let abort = AbortHandle::new();
    let on_ctrl_c = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.abort();
        }
    });

    let client = Client::from_env()?;
    let options = PollOptions::new(Duration::from_secs(300))
        .interval(Duration::from_secs(1))
        .abort_signal(abort.signal());
    let request = RunCreateRequest::new(assistant_id).tool(serde_json::json!({
        "type": "function",
        "function": {
            "name": "get_time",
            "description": "Current UTC time",
            "parameters": {"type": "object", "properties": {}}
        }
    }));

    let run = client
        .runs()
        .create_and_run_auto(&thread_id, &request, answer, &options)
        .await?;
    println!("run {} finished as {}", run.id, run.status);
    if let Some(error) = &run.last_error {
        eprintln!("last error: {} ({})", error.message, error.code);
    }
    Ok(())
}

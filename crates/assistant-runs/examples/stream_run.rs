use assistant_runs::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    assistant_runs::init_observability();

    let thread_id = std::env::var("THREAD_ID")
        .map_err(|_| ClientError::Config("set THREAD_ID to an existing thread".into()))?;
    let assistant_id = std::env::var("ASSISTANT_ID")
        .map_err(|_| ClientError::Config("set ASSISTANT_ID to an existing assistant".into()))?;

    let client = Client::from_env()?;
    let snapshot = client
        .runs()
        .create_stream(
            &thread_id,
            &RunCreateRequest::new(assistant_id),
            |event| {
                if let AssistantEvent::MessageDelta { delta, .. } = event {
                    for fragment in delta.text_fragments() {
                        print!("{fragment}");
                    }
                }
                StreamControl::Continue
            },
        )
        .await?;
    println!();

    match snapshot.final_run() {
        Some(run) => println!("run {} ended as {}", run.id, run.status),
        None => println!("stream ended without a run event"),
    }
    for error in snapshot.errors() {
        eprintln!("stream error: {}", error.message);
    }
    Ok(())
}

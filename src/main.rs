use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    qa_chatbot::run().await
}

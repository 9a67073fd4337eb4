#[tokio::main]
async fn main() {
    let code = hsmlink_cli::run().await;
    std::process::exit(code);
}

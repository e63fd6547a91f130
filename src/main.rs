#[tokio::main]
async fn main() {
    if let Err(e) = tandarust_lib::run().await {
        eprintln!("tandarust: {e}");
        std::process::exit(1);
    }
}

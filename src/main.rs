#[tokio::main]
async fn main() {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if let Err(error) = risk_dashboard_lib::run(args).await {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}

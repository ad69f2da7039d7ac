use colored::Colorize;
use kvconf_core::{api_types::AVAILABLE_ENDPOINTS, cors::CorsPolicy};
use std::net::SocketAddr;

pub fn print_server_url(addr: SocketAddr, cors: &CorsPolicy, token_required: bool) {
    let url = format!("http://{}", addr);

    println!("The config service is available at:");
    println!();
    println!("   {}", url.bright_purple());
    println!();
    println!("Point the dashboard shim at it, for example:");
    println!();
    println!("    KVCONF_URL={} kvconf get", url.bright_purple());
    println!();
    println!("Endpoints:");
    for endpoint in AVAILABLE_ENDPOINTS {
        println!("    {}", endpoint.bright_black());
    }
    println!();
    println!("Allowed origins:");
    for origin in cors.allowed_origins() {
        println!("    {}", origin.bright_blue());
    }
    println!();
    if !token_required {
        println!(
            "{} {} {}",
            "****".bright_yellow().bold(),
            "No API token set: anyone who can reach this server can overwrite the config."
                .bright_red()
                .bold(),
            "****".bright_yellow().bold(),
        );
        println!();
    }
}

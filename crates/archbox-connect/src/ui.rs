//! User-facing progress text on stdout. Diagnostics go through `tracing`.

#![allow(clippy::print_stdout)]

pub fn header() {
    println!();
    println!("  archbox-connect");
    println!("  Remote Desktop via Moonlight");
    println!();
}

pub fn step(message: &str) {
    println!("  {message}");
}

pub fn guidance(lines: &[String]) {
    for line in lines {
        println!("    {line}");
    }
}

pub fn tunnel_up(client_name: &str) {
    println!();
    println!("  ========================================");
    println!("    Tunnel is UP!");
    println!();
    println!("    Open {client_name} and connect to:");
    println!("               localhost");
    println!();
    println!("    Press Ctrl+C to disconnect");
    println!("  ========================================");
    println!();
}

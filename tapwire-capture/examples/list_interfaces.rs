//! Example: List all network interfaces
//!
//! Run with: cargo run --example list_interfaces

use tapwire_capture::{default_interface, list_capture_interfaces, list_interfaces};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== All Network Interfaces ===\n");

    for iface in &list_interfaces()? {
        println!("Interface: {} (index {})", iface.name, iface.index);
        if !iface.description.is_empty() {
            println!("  Description: {}", iface.description);
        }

        if let Some(ref mac) = iface.mac {
            println!("  MAC Address: {}", mac);
        }

        println!("  Addresses:");
        for addr in &iface.addresses {
            println!("    - {}/{}", addr.ip, addr.prefix);
        }

        if let Some(net) = iface.ipv4_net() {
            println!("  Filter network: {}", net);
        }

        println!(
            "  Up: {}, Loopback: {}, Multicast: {}, Capture Capable: {}",
            iface.is_up,
            iface.is_loopback,
            iface.is_multicast,
            iface.is_capture_capable()
        );
        println!();
    }

    println!("=== Capture-Capable Interfaces ===\n");
    for iface in &list_capture_interfaces()? {
        println!("  {}", iface.name);
    }

    println!("\n=== Default Interface ===\n");
    match default_interface() {
        Ok(iface) => {
            println!("Default: {}", iface.name);
            if let Some(ipv4) = iface.primary_ipv4() {
                println!("Primary IPv4: {}", ipv4);
            }
        }
        Err(e) => println!("No default interface found: {}", e),
    }

    Ok(())
}

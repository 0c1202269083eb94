use water_reminder::notification::WebPushConfig;

const DEFAULT_SUBJECT: &str = "mailto:example@yourdomain.com";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let json = args.iter().any(|a| a == "--json");
    let subject = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with('-'))
        .map(String::as_str)
        .unwrap_or(DEFAULT_SUBJECT);

    let keys = WebPushConfig::generate(subject);
    let public_b64 = keys.vapid_public_key_b64();
    let private_b64 = keys.vapid_private_key_b64();

    if json {
        let out = serde_json::json!({
            "public_key": public_b64,
            "private_key": private_b64,
            "subject": keys.vapid_subject(),
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("VAPID_PUBLIC_KEY={}", public_b64);
        println!("VAPID_PRIVATE_KEY={}", private_b64);
        println!("VAPID_SUBJECT={}", keys.vapid_subject());
    }

    Ok(())
}

fn print_help() {
    println!("water-reminder-vapid - Generate VAPID keys for Web Push");
    println!();
    println!("Usage:");
    println!("  water-reminder-vapid [SUBJECT]          # prints .env lines");
    println!("  water-reminder-vapid [SUBJECT] --json   # prints JSON");
    println!();
    println!("SUBJECT defaults to {}.", DEFAULT_SUBJECT);
    println!("Paste the output into .env so subscriptions survive restarts.");
}

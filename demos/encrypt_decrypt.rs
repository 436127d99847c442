use std::io;

use webpgp::{decrypt, encrypt_with, generate_key_pair, EncryptOptions};

fn main() -> webpgp::Result<()> {
    pretty_env_logger::init();

    let alice = generate_key_pair("Alice <alice@example.com>", "correct horse")?;
    let bob = generate_key_pair("Bob <bob@example.com>", "battery staple")?;
    println!("{}", bob.public_key_text);

    let mut message = Vec::new();
    encrypt_with(
        &b"Secret message"[..],
        &bob.public_key_text,
        &alice.secret_key_text,
        "correct horse",
        &mut message,
        &EncryptOptions::default().armor(true).file_name("message.txt"),
        &mut rand::thread_rng(),
    )?;
    println!("{}", String::from_utf8_lossy(&message));

    let result = decrypt(&message[..], &bob.secret_key_text, "battery staple", io::stdout())?;
    println!();
    println!("file name: {:?}, signature: {}", result.file_name, result.verification);

    Ok(())
}

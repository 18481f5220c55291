use std::{env, io::{self, BufRead, Write}, process::exit};
use rkvd::cli::RedisCli;

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut host = "127.0.0.1".to_string();
    let mut port = 6379u16;
    if args.len() >= 2 {
        host = args[1].clone();
    }
    if args.len() >= 3 {
        match args[2].parse::<u16>() {
            Ok(p) => port = p,
            Err(_) => {
                eprintln!("Usage: ./rkvd-cli [host] [port]");
                exit(1);
            },
        }
    }

    let mut cli = RedisCli::new();
    if let Err(e) = cli.connect(&host, port) {
        eprintln!("Could not connect to {}:{}: {}", host, port, e);
        exit(1);
    }

    let stdin = io::stdin();
    loop {
        print!("{}:{}> ", host, port);
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {},
            Err(_) => break,
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        cli.add_command(line);
        println!("{}", cli.get_reply());
    }
}

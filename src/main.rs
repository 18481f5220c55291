use std::{env, process::exit, sync::Arc};
use rkvd::{
    ae::{ae_main, set_before_sleep_proc},
    server::{before_sleep, init_server, server_read, server_write},
    util::{log, LogLevel},
};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() == 2 {
        match args[1].parse::<u16>() {
            Ok(port) => {
                server_write().set_port(port);
            },
            Err(_) => {
                eprintln!("Usage: ./rkvd [port]");
                exit(1);
            },
        }
    } else if args.len() > 2 {
        eprintln!("Usage: ./rkvd [port]");
        exit(1);
    }

    if let Err(e) = init_server() {
        log(LogLevel::Warning, &format!("Can't start the server: {}", e));
        exit(1);
    }

    log(
        LogLevel::Notice,
        &format!(
            "The server is now ready to accept connections on port {}",
            server_read().port()
        ),
    );
    set_before_sleep_proc(Some(Arc::new(before_sleep)));
    ae_main();
}

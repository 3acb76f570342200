use std::env;
use std::process;
use supervisord_client::{ProcessControl, RpcClient, TailOptions};
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} <supervisord.conf> <process_name> [stderr]", args[0]);
        process::exit(1);
    }

    let config_file = &args[1];
    let name = &args[2];
    let use_stderr = args.get(3).is_some_and(|a| a == "stderr");

    let client = match RpcClient::from_config_file(config_file).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error connecting to supervisord: {}", e);
            process::exit(1);
        }
    };

    let processes = ProcessControl::new(client);
    let tail = if use_stderr {
        processes.tail_stderr_log(name, TailOptions::default()).await
    } else {
        processes.tail_stdout_log(name, TailOptions::default()).await
    };

    match tail {
        Ok(mut stream) => {
            eprintln!("Tailing {} log of {}", if use_stderr { "stderr" } else { "stdout" }, name);
            while let Some(line) = stream.next().await {
                match line {
                    Ok(content) => print!("{}", content),
                    Err(e) => {
                        eprintln!("Error tailing log: {}", e);
                        process::exit(1);
                    }
                }
            }
        }
        Err(e) => {
            eprintln!("Error starting tail: {}", e);
            process::exit(1);
        }
    }
}

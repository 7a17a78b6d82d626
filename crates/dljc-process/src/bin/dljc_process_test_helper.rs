use std::{
    env,
    io::{self, Write},
    process,
    thread,
    time::Duration,
};

fn parse_u64(value: Option<String>, flag: &str) -> u64 {
    let value = value.unwrap_or_else(|| {
        eprintln!("missing value for {flag}");
        process::exit(2);
    });
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid u64 for {flag}: {value}");
        process::exit(2);
    })
}

fn parse_i32(value: Option<String>, flag: &str) -> i32 {
    let value = value.unwrap_or_else(|| {
        eprintln!("missing value for {flag}");
        process::exit(2);
    });
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid i32 for {flag}: {value}");
        process::exit(2);
    })
}

fn required(value: Option<String>, flag: &str) -> String {
    value.unwrap_or_else(|| {
        eprintln!("missing value for {flag}");
        process::exit(2);
    })
}

fn spawn_child_sleep(ms: u64) {
    let exe = env::current_exe().unwrap_or_else(|err| {
        eprintln!("failed to resolve current exe: {err}");
        process::exit(2);
    });

    let _child = process::Command::new(exe)
        .args(["--sleep-ms", &ms.to_string()])
        .spawn()
        .unwrap_or_else(|err| {
            eprintln!("failed to spawn child: {err}");
            process::exit(2);
        });
}

fn main() {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stdout-line" => {
                let line = required(args.next(), "--stdout-line");
                let mut out = io::stdout().lock();
                writeln!(out, "{line}").unwrap();
                out.flush().unwrap();
            }
            "--stderr-line" => {
                let line = required(args.next(), "--stderr-line");
                let mut err = io::stderr().lock();
                writeln!(err, "{line}").unwrap();
                err.flush().unwrap();
            }
            "--exit-code" => {
                let code = parse_i32(args.next(), "--exit-code");
                process::exit(code);
            }
            "--sleep-ms" => {
                let ms = parse_u64(args.next(), "--sleep-ms");
                thread::sleep(Duration::from_millis(ms));
            }
            "--spawn-child-sleep-ms" => {
                let ms = parse_u64(args.next(), "--spawn-child-sleep-ms");
                spawn_child_sleep(ms);
            }
            other => {
                eprintln!("unknown argument: {other}");
                process::exit(2);
            }
        }
    }
}

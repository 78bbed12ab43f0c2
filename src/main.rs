fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if handle_cli_flags(&args) {
        return;
    }

    if let Err(err) = railclub::app::run(&args) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags(args: &[String]) -> bool {
    let mut saw_flag = false;
    for arg in args {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("railclub {}", railclub::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "railclub — client for the Railclub train-route and profile service.\n\n  stations <query>                     Search station codes\n  routes <code_from> <code_to>         List today's trains between stations\n  stops <train> <code_from> <code_to>  Show a train's stops\n  profile [user]                       Show a profile\n  login <username> <password>          Sign in to an account\n  register <username> <password>       Create an account\n  whoami                               Show the signed-in account\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}

use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("accountd")
        .about("Account registration, login and bearer tokens")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .env("ACCOUNTD_DSN")
                .required(true),
        )
        .arg(
            Arg::new("max-connections")
                .long("max-connections")
                .help("Maximum number of pooled database connections")
                .default_value("5")
                .env("ACCOUNTD_MAX_CONNECTIONS")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("store-timeout")
                .long("store-timeout")
                .help("Per-operation store timeout in milliseconds")
                .default_value("5000")
                .env("ACCOUNTD_STORE_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("HS256 signing secret")
                .env("ACCOUNTD_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("jwt-issuer")
                .long("jwt-issuer")
                .help("Token issuer (iss)")
                .default_value("accountd")
                .env("ACCOUNTD_JWT_ISSUER"),
        )
        .arg(
            Arg::new("jwt-audience")
                .long("jwt-audience")
                .help("Token audience (aud)")
                .default_value("accountd")
                .env("ACCOUNTD_JWT_AUDIENCE"),
        )
        .arg(
            Arg::new("jwt-ttl")
                .long("jwt-ttl")
                .help("Token lifetime in seconds")
                .default_value("3600")
                .env("ACCOUNTD_JWT_TTL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("monitor-interval")
                .long("monitor-interval")
                .help("Seconds between account count logs")
                .default_value("10")
                .env("ACCOUNTD_MONITOR_INTERVAL")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .help("Emit logs as JSON")
                .env("ACCOUNTD_LOG_JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("ACCOUNTD_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

use clap::{Arg, Command, ValueHint};
use sieve_cli::input::Input;
use sieve_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("SIEVE_LOG", "error,sieve=info"))
        .init();

    let matches = Command::new("sieve")
        .version(clap::crate_version!())
        .about("Target-decoy validation and hierarchical reports of proteomics identifications")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("identifications")
                .short('i')
                .long("identifications")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to identifications (JSON file). Overrides the file \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("annotations")
                .short('a')
                .long("annotations")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to protein and gene annotations (JSON file). Overrides the file \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where reports will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let input = Input::from_arguments(matches)?;

    let runner = input.build().and_then(Runner::new)?;
    let parameters = runner.run()?;
    println!("{}", serde_json::to_string_pretty(&parameters)?);

    Ok(())
}

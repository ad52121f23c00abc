use std::path::Path;
use std::time::Duration;

use clap::{command, value_parser, Arg, ArgAction, Command};

use crate::config::{AnalysisConfig, SizeMode};
use crate::errors::HprofRetainError;
use crate::errors::HprofRetainError::InputFileNotFound;

pub struct CliOptions {
    pub file_path: String,
    pub config: AnalysisConfig,
    pub debug: bool,
    pub output: Option<String>,
}

fn app() -> Command {
    command!()
        .arg(
            Arg::new("inputFile")
                .help("binary hprof input file")
                .long("inputFile")
                .short('i')
                .required(true),
        )
        .arg(
            Arg::new("top")
                .help("classes in the histogram, 0 for unbounded")
                .long("top")
                .short('t')
                .value_parser(value_parser!(usize))
                .default_value("50"),
        )
        .arg(
            Arg::new("retainers")
                .help("entries per retainer table")
                .long("retainers")
                .short('r')
                .value_parser(value_parser!(usize))
                .default_value("20"),
        )
        .arg(
            Arg::new("maxDepth")
                .help("retainer BFS depth")
                .long("maxDepth")
                .value_parser(value_parser!(u8))
                .default_value("3"),
        )
        .arg(
            Arg::new("maxSamples")
                .help("sampling budget per analyzed class")
                .long("maxSamples")
                .value_parser(value_parser!(usize))
                .default_value("1000"),
        )
        .arg(
            Arg::new("sizeMode")
                .help("object header model")
                .long("sizeMode")
                .value_parser(["compressed", "uncompressed"])
                .default_value("compressed"),
        )
        .arg(
            Arg::new("workers")
                .help("maximum analysis workers (defaults to hardware threads)")
                .long("workers")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("timeoutSecs")
                .help("analysis deadline in seconds")
                .long("timeoutSecs")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("fast")
                .help("lossy fast mode: estimated retained sizes, no graphs or business retainers")
                .long("fast")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skipBusiness")
                .help("skip the business retainer phase")
                .long("skipBusiness")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("liveOnly")
                .help("exclude unreachable objects from the histogram")
                .long("liveOnly")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .help("path of the JSON report (defaults to a timestamped file)")
                .long("output")
                .short('o'),
        )
        .arg(
            Arg::new("debug")
                .help("debug info")
                .long("debug")
                .short('d')
                .action(ArgAction::SetTrue),
        )
}

pub fn get_args() -> Result<CliOptions, HprofRetainError> {
    let matches = match app().try_get_matches() {
        Ok(matches) => matches,
        // --help and --version print and exit; real errors bubble up
        Err(e)
            if e.kind() == clap::error::ErrorKind::DisplayHelp
                || e.kind() == clap::error::ErrorKind::DisplayVersion =>
        {
            e.exit()
        }
        Err(e) => return Err(e.into()),
    };

    let input_file = matches
        .get_one::<String>("inputFile")
        .expect("required argument")
        .trim()
        .to_string();
    if !Path::new(&input_file).is_file() {
        return Err(InputFileNotFound { name: input_file });
    }

    let mut config = AnalysisConfig {
        top_classes_n: *matches.get_one::<usize>("top").expect("defaulted"),
        top_retainers_n: *matches.get_one::<usize>("retainers").expect("defaulted"),
        retainer_max_depth: *matches.get_one::<u8>("maxDepth").expect("defaulted"),
        fast_mode: matches.get_flag("fast"),
        skip_business_retainers: matches.get_flag("skipBusiness"),
        include_unreachable: !matches.get_flag("liveOnly"),
        size_mode: match matches
            .get_one::<String>("sizeMode")
            .expect("defaulted")
            .as_str()
        {
            "uncompressed" => SizeMode::Uncompressed,
            _ => SizeMode::Compressed,
        },
        ..AnalysisConfig::default()
    };
    config.sampling.max_samples = *matches.get_one::<usize>("maxSamples").expect("defaulted");
    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config.parallel.max_workers = workers.max(1);
    }
    if let Some(&timeout_secs) = matches.get_one::<u64>("timeoutSecs") {
        if timeout_secs == 0 {
            return Err(HprofRetainError::InvalidArgument {
                message: "timeoutSecs must be positive".to_string(),
            });
        }
        config.parallel.timeout = Some(Duration::from_secs(timeout_secs));
    }

    Ok(CliOptions {
        file_path: input_file,
        config,
        debug: matches.get_flag("debug"),
        output: matches.get_one::<String>("output").cloned(),
    })
}

#[cfg(test)]
mod args_tests {
    use super::app;

    #[test]
    fn verify_app() {
        app().debug_assert();
    }

    #[test]
    fn defaults_parse() {
        let matches = app()
            .try_get_matches_from(["hprof-retain", "-i", "heap.hprof"])
            .unwrap();
        assert_eq!(matches.get_one::<usize>("top"), Some(&50));
        assert_eq!(matches.get_one::<u8>("maxDepth"), Some(&3));
        assert!(!matches.get_flag("fast"));
    }

    #[test]
    fn flags_and_values_parse() {
        let matches = app()
            .try_get_matches_from([
                "hprof-retain",
                "-i",
                "heap.hprof",
                "--top",
                "0",
                "--fast",
                "--sizeMode",
                "uncompressed",
                "--workers",
                "4",
            ])
            .unwrap();
        assert_eq!(matches.get_one::<usize>("top"), Some(&0));
        assert!(matches.get_flag("fast"));
        assert_eq!(
            matches.get_one::<String>("sizeMode").map(String::as_str),
            Some("uncompressed")
        );
        assert_eq!(matches.get_one::<usize>("workers"), Some(&4));
    }
}

use std::time::Instant;

use hprof_retain::analysis::run_full_analysis;
use hprof_retain::args::get_args;
use hprof_retain::errors::HprofRetainError;
use hprof_retain::report::render_parse_summary;
use hprof_retain::slurp::slurp_file;

fn main() -> Result<(), HprofRetainError> {
    let started = Instant::now();
    let options = get_args()?;

    let slurped = slurp_file(&options.file_path, options.config.size_mode, options.debug)?;
    println!("{}", render_parse_summary(&slurped.stats));

    let report = run_full_analysis(
        &slurped.header,
        &slurped.graph,
        &slurped.stats,
        &options.config,
    )?;
    println!("{}", report.render_text(options.config.top_classes_n));

    let output_path = report.save_as_file(options.output)?;
    println!("Output JSON result file {output_path}");
    println!("Analysis done in {:?}", started.elapsed());
    Ok(())
}

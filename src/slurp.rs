//! End-to-end ingestion: file header, prefetch thread, streaming record
//! parser thread and graph-builder thread wired together over pooled
//! channels, with a progress bar fed from the parser.

use std::fs::File;
use std::io::{BufReader, Read};

use indicatif::{ProgressBar, ProgressStyle};

use crossbeam_channel::{Receiver, Sender};

use crate::config::SizeMode;
use crate::errors::HprofRetainError;
use crate::errors::HprofRetainError::{InvalidHeaderSize, InvalidHprofFile, InvalidIdSize, StdThreadError};
use crate::graph::builder::{BuiltGraph, GraphBuilder, ParseStats};
use crate::graph::ReferenceGraph;
use crate::parser::file_header_parser::{parse_file_header, FileHeader};
use crate::parser::record::Record;
use crate::parser::record_stream_parser::HprofRecordStreamParser;
use crate::prefetch_reader::PrefetchReader;
use crate::utils::pretty_bytes_size;

// the exact size of the file header (31 bytes)
const FILE_HEADER_LENGTH: usize = 31;

// 64 MB buffer performs nicely (higher is faster but increases the memory consumption)
pub const READ_BUFFER_SIZE: usize = 64 * 1024 * 1024;

pub struct SlurpResult {
    pub header: FileHeader,
    pub graph: ReferenceGraph,
    pub stats: ParseStats,
}

pub fn slurp_file(
    file_path: &str,
    size_mode: SizeMode,
    debug_mode: bool,
) -> Result<SlurpResult, HprofRetainError> {
    let file = File::open(file_path)?;
    let file_len = file.metadata()?.len() as usize;
    let mut reader = BufReader::new(file);

    // Parse file header
    let header = slurp_header(&mut reader)?;
    let id_size = header.size_pointers;
    println!(
        "Processing {} binary hprof file in '{}' format.",
        pretty_bytes_size(file_len as u64),
        header.format
    );

    // Communication channel from pre-fetcher to parser
    let (send_data, receive_data): (Sender<Vec<u8>>, Receiver<Vec<u8>>) =
        crossbeam_channel::unbounded();

    // Communication channel from parser to pre-fetcher (pooled input buffers)
    let (send_pooled_data, receive_pooled_data): (Sender<Vec<u8>>, Receiver<Vec<u8>>) =
        crossbeam_channel::unbounded();

    // Init pooled binary data with more than 1 element to enable the reader
    // to make progress independently
    for _ in 0..2 {
        send_pooled_data
            .send(Vec::with_capacity(READ_BUFFER_SIZE))
            .expect("pre-fetcher channel should be alive");
    }

    // Communication channel from parser to graph builder
    let (send_records, receive_records): (Sender<Vec<Record>>, Receiver<Vec<Record>>) =
        crossbeam_channel::unbounded();

    // Communication channel from graph builder to parser (pooled record buffers)
    let (send_pooled_vec, receive_pooled_vec): (Sender<Vec<Record>>, Receiver<Vec<Record>>) =
        crossbeam_channel::unbounded();

    // Communication channel from graph builder to main
    let (send_result, receive_result): (Sender<BuiltGraph>, Receiver<BuiltGraph>) =
        crossbeam_channel::unbounded();

    // Communication channel from parser to main
    let (send_progress, receive_progress): (Sender<usize>, Receiver<usize>) =
        crossbeam_channel::unbounded();

    // Fatal parse errors from the parser thread to main
    let (send_error, receive_error): (Sender<HprofRetainError>, Receiver<HprofRetainError>) =
        crossbeam_channel::unbounded();

    // Init pre-fetcher
    let prefetcher = PrefetchReader::new(reader, file_len, FILE_HEADER_LENGTH, READ_BUFFER_SIZE);
    let prefetch_thread = prefetcher.start(send_data, receive_pooled_data)?;

    // Init pooled result vec
    send_pooled_vec
        .send(Vec::new())
        .expect("builder channel should be alive");

    // Init stream parser
    let initial_loop_buffer = Vec::with_capacity(READ_BUFFER_SIZE); // will be added to the data pool after the first chunk
    let stream_parser = HprofRecordStreamParser::new(
        id_size,
        debug_mode,
        file_len,
        FILE_HEADER_LENGTH,
        initial_loop_buffer,
    );

    // Start stream parser
    let parser_thread = stream_parser.start(
        receive_data,
        send_pooled_data,
        send_progress,
        receive_pooled_vec,
        send_records,
        send_error,
    )?;

    // Init graph builder
    let graph_builder = GraphBuilder::new(id_size, size_mode);
    let builder_thread = graph_builder.start(receive_records, send_result, send_pooled_vec)?;

    // Init progress bar
    let pb = ProgressBar::new(file_len as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} (speed:{bytes_per_sec}) (eta:{eta})")
        .expect("templating should never fail")
        .progress_chars("#>-"));

    // Feed progress bar
    while let Ok(processed) = receive_progress.recv() {
        pb.set_position(processed as u64);
    }

    // Finish and remove progress bar
    pb.finish_and_clear();

    // Blocks until pre-fetcher is done
    prefetch_thread.join().map_err(|e| StdThreadError { e })?;

    // Blocks until parser is done
    parser_thread.join().map_err(|e| StdThreadError { e })?;

    // A fatal parse error wins over whatever partial graph was assembled
    if let Ok(error) = receive_error.try_recv() {
        builder_thread.join().map_err(|e| StdThreadError { e })?;
        return Err(error);
    }

    // Wait for the built graph
    let built = receive_result
        .recv()
        .expect("result channel should be alive");

    // Blocks until the graph builder is done
    builder_thread.join().map_err(|e| StdThreadError { e })?;

    Ok(SlurpResult {
        header,
        graph: built.graph,
        stats: built.stats,
    })
}

pub fn slurp_header(reader: &mut BufReader<File>) -> Result<FileHeader, HprofRetainError> {
    let mut header_buffer = vec![0; FILE_HEADER_LENGTH];
    reader.read_exact(&mut header_buffer)?;
    let (rest, header) = parse_file_header(&header_buffer).map_err(|e| InvalidHprofFile {
        message: format!("{e:?}"),
    })?;
    // Invariants
    let id_size = header.size_pointers;
    if id_size != 4 && id_size != 8 {
        return Err(InvalidIdSize);
    }
    if !rest.is_empty() {
        return Err(InvalidHeaderSize);
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write dump");
        file.flush().expect("flush dump");
        file
    }

    fn header_bytes(id_size: u32) -> Vec<u8> {
        let mut bytes = b"JAVA PROFILE 1.0.2\0".to_vec();
        bytes.extend_from_slice(&id_size.to_be_bytes());
        bytes.extend_from_slice(&0u64.to_be_bytes());
        bytes
    }

    #[test]
    fn header_with_invalid_id_size_is_rejected() {
        let file = write_temp(&header_bytes(3));
        let opened = File::open(file.path()).unwrap();
        let mut reader = BufReader::new(opened);
        assert!(matches!(
            slurp_header(&mut reader),
            Err(HprofRetainError::InvalidIdSize)
        ));
    }

    #[test]
    fn short_header_is_rejected() {
        let file = write_temp(b"JAVA");
        let opened = File::open(file.path()).unwrap();
        let mut reader = BufReader::new(opened);
        assert!(slurp_header(&mut reader).is_err());
    }

    #[test]
    fn both_id_sizes_pass_header_validation() {
        for id_size in [4u32, 8] {
            let file = write_temp(&header_bytes(id_size));
            let opened = File::open(file.path()).unwrap();
            let mut reader = BufReader::new(opened);
            let header = slurp_header(&mut reader).unwrap();
            assert_eq!(header.size_pointers, id_size);
        }
    }

    #[test]
    fn empty_dump_slurps_to_empty_graph() {
        let file = write_temp(&header_bytes(8));
        let result = slurp_file(
            file.path().to_str().unwrap(),
            SizeMode::Compressed,
            false,
        )
        .unwrap();
        assert_eq!(result.graph.object_count(), 0);
        assert_eq!(result.stats.heap_dumps, 0);
        assert_eq!(result.header.size_pointers, 8);
    }
}

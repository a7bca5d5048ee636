use ndchunk::array::{Array, ArrayErrorKind, ArrayParams, FillValue, StorageSpec};
use ndchunk::storage::storage_adapter::UsageLog;
use ndchunk::storage::StorageBackend;
use std::sync::{Arc, Mutex};

struct AppendCase {
    shape: &'static [u64],
    chunk_shape: &'static [u64],
    block_shape: &'static [u64],
    buffer_shape: &'static [u64],
    axis: usize,
}

const CASES: [AppendCase; 4] = [
    AppendCase {
        shape: &[5],
        chunk_shape: &[3],
        block_shape: &[2],
        buffer_shape: &[10],
        axis: 0,
    },
    AppendCase {
        shape: &[18, 6],
        chunk_shape: &[6, 6],
        block_shape: &[3, 3],
        buffer_shape: &[18, 12],
        axis: 1,
    },
    AppendCase {
        shape: &[12, 10, 14],
        chunk_shape: &[3, 5, 9],
        block_shape: &[3, 4, 4],
        buffer_shape: &[12, 10, 18],
        axis: 2,
    },
    AppendCase {
        shape: &[10, 10, 5, 5],
        chunk_shape: &[5, 7, 3, 3],
        block_shape: &[2, 2, 1, 1],
        buffer_shape: &[10, 10, 5, 30],
        axis: 3,
    },
];

fn fill_value(element_size: usize) -> FillValue {
    match element_size {
        1 => FillValue::from(1u8),
        2 => FillValue::from(1u16),
        4 => FillValue::from(1u32),
        _ => FillValue::from(1u64),
    }
}

/// A sequential buffer of `num_elements` elements, each the native endian encoding of its index.
fn sequential_bytes(num_elements: u64, element_size: usize) -> Vec<u8> {
    (0..num_elements)
        .flat_map(|index| index.to_ne_bytes()[..element_size].to_vec())
        .collect()
}

fn append_case(
    case: &AppendCase,
    element_size: usize,
    backend: StorageBackend,
    usage_log: Option<UsageLog>,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = ArrayParams::new(case.shape.to_vec(), element_size)?;
    let mut storage = StorageSpec::new(
        case.chunk_shape.to_vec(),
        case.block_shape.to_vec(),
        backend,
    )?;
    storage
        .set_remove_existing(true)
        .set_num_threads(2)
        .set_usage_log(usage_log);
    let fill_value = fill_value(element_size);
    let mut array = Array::new_full(&params, &storage, &fill_value)?;

    let buffer_elements: u64 = case.buffer_shape.iter().product();
    let buffer = sequential_bytes(buffer_elements, element_size);
    array.append(&buffer, case.axis)?;

    let axis = case.axis;
    let mut shape = case.shape.to_vec();
    shape[axis] += case.buffer_shape[axis];
    assert_eq!(array.shape(), shape);
    assert_eq!(array.store().num_chunks(), array.num_chunks());

    let mut start = vec![0; shape.len()];
    start[axis] = case.shape[axis];
    let mut stop = case.shape.to_vec();
    stop[axis] = case.shape[axis] + case.buffer_shape[axis];
    let mut dest = vec![0u8; buffer.len()];
    array.get_slice(&start, &stop, &mut dest, case.buffer_shape)?;
    assert_eq!(dest, buffer);

    let mut original = vec![0u8; params.size_bytes() as usize];
    array.get_slice(
        &vec![0; shape.len()],
        case.shape,
        &mut original,
        case.shape,
    )?;
    assert!(fill_value.equals_all(&original));

    array.free()?;
    Ok(())
}

#[test]
fn append_memory() -> Result<(), Box<dyn std::error::Error>> {
    for case in &CASES {
        for element_size in [1, 2, 4, 8] {
            append_case(case, element_size, StorageBackend::Memory, None)?;
        }
    }
    Ok(())
}

#[test]
fn append_contiguous_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    for case in &CASES {
        for element_size in [1, 2, 4, 8] {
            let path = dir.path().join("append.ndc");
            append_case(case, element_size, StorageBackend::ContiguousFile(path), None)?;
        }
    }
    Ok(())
}

#[test]
fn append_directory() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    for case in &CASES {
        for element_size in [1, 2, 4, 8] {
            let path = dir.path().join("append");
            append_case(case, element_size, StorageBackend::Directory(path), None)?;
        }
    }
    Ok(())
}

#[test]
fn append_usage_log() -> Result<(), Box<dyn std::error::Error>> {
    let log_writer = Arc::new(Mutex::new(Vec::<u8>::new()));
    let usage_log = UsageLog::new(log_writer.clone(), String::new);
    for case in &CASES {
        for element_size in [1, 2, 4, 8] {
            append_case(
                case,
                element_size,
                StorageBackend::Memory,
                Some(usage_log.clone()),
            )?;
        }
    }
    let log = String::from_utf8(log_writer.lock().map_err(|err| err.to_string())?.clone())?;
    assert!(log.lines().any(|line| line.starts_with("write_header(")));
    assert!(log.lines().any(|line| line.starts_with("erase_record(")));
    Ok(())
}

#[test]
fn append_column() -> Result<(), Box<dyn std::error::Error>> {
    let params = ArrayParams::new(vec![18, 6], 4)?;
    let storage = StorageSpec::new(vec![6, 6], vec![3, 3], StorageBackend::Memory)?;
    let mut array = Array::new_full(&params, &storage, &FillValue::from(1i32))?;
    let buffer: Vec<i32> = (0..18 * 6).collect();
    array.append_elements(&buffer, 1)?;
    assert_eq!(array.shape(), &[18, 12]);

    let mut dest = vec![0u8; buffer.len() * 4];
    array.get_slice(&[0, 6], &[18, 12], &mut dest, &[18, 6])?;
    assert_eq!(dest, ndchunk::bytemuck::cast_slice::<i32, u8>(&buffer));
    Ok(())
}

#[test]
fn append_ragged_1d() -> Result<(), Box<dyn std::error::Error>> {
    let params = ArrayParams::new(vec![5], 1)?;
    let storage = StorageSpec::new(vec![3], vec![2], StorageBackend::Memory)?;
    let mut array = Array::new_full(&params, &storage, &FillValue::from(1u8))?;
    let buffer: Vec<u8> = (100..110).collect();
    array.append(&buffer, 0)?;
    assert_eq!(array.shape(), &[15]);

    let mut dest = vec![0u8; 10];
    array.get_slice(&[5], &[15], &mut dest, &[10])?;
    assert_eq!(dest, buffer);
    let mut dest = vec![0u8; 5];
    array.get_slice(&[0], &[5], &mut dest, &[5])?;
    assert_eq!(dest, [1; 5]);
    Ok(())
}

#[test]
fn append_repeated() -> Result<(), Box<dyn std::error::Error>> {
    // repeated small appends along the outer and inner axes
    let params = ArrayParams::new(vec![1, 1], 2)?;
    let storage = StorageSpec::new(vec![3, 2], vec![2, 2], StorageBackend::Memory)?;
    let mut array = Array::new_empty(&params, &storage)?;
    for value in 1..=4u16 {
        let columns = array.shape()[1] as usize;
        array.append_elements(&vec![value; columns], 0)?;
        let rows = array.shape()[0] as usize;
        array.append_elements(&vec![value; rows], 1)?;
    }
    assert_eq!(array.shape(), &[5, 5]);
    let elements = array.retrieve_array_subset_elements::<u16>(&array.subset_all())?;
    #[rustfmt::skip]
    assert_eq!(elements, [
        0, 1, 2, 3, 4,
        1, 1, 2, 3, 4,
        2, 2, 2, 3, 4,
        3, 3, 3, 3, 4,
        4, 4, 4, 4, 4,
    ]);
    Ok(())
}

#[test]
fn append_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let params = ArrayParams::new(vec![4, 3], 2)?;
    let storage = StorageSpec::new(vec![2, 2], vec![2, 2], StorageBackend::Memory)?;
    let mut array = Array::new_empty(&params, &storage)?;
    assert_eq!(
        array.append(&[0; 6], 2).unwrap_err().kind(),
        ArrayErrorKind::InvalidArgument
    );
    assert_eq!(
        array.append(&[0; 7], 0).unwrap_err().kind(),
        ArrayErrorKind::InvalidArgument
    );
    assert_eq!(
        array.append_elements(&[0u32; 3], 0).unwrap_err().kind(),
        ArrayErrorKind::InvalidArgument
    );
    assert_eq!(array.shape(), &[4, 3]);
    array.append(&[], 1)?;
    assert_eq!(array.shape(), &[4, 3]);
    Ok(())
}

use ndchunk::array::{
    Array, ArrayCreateError, ArrayErrorKind, ArrayParams, Compressor, FillValue, StorageSpec,
};
use ndchunk::storage::{StorageBackend, StorageError};

fn persist_and_reopen(backend: StorageBackend) -> Result<(), Box<dyn std::error::Error>> {
    let params = ArrayParams::new(vec![6, 5], 4)?;
    let mut storage = StorageSpec::new(vec![4, 3], vec![2, 2], backend.clone())?;
    storage.set_remove_existing(true);
    let elements: Vec<f32> = (0..30u16).map(f32::from).collect();
    let mut array = Array::new_from_bytes(
        &params,
        &storage,
        ndchunk::bytemuck::cast_slice(&elements),
    )?;
    array.append_elements(&[100.0f32; 5], 0)?;
    array.free()?;

    let mut array = Array::open(&backend)?;
    assert_eq!(array.shape(), &[7, 5]);
    assert_eq!(array.element_size(), 4);
    assert_eq!(array.chunk_shape().to_array_shape(), vec![4, 3]);
    assert_eq!(array.block_shape().to_array_shape(), vec![2, 2]);
    assert_eq!(array.compressor(), storage.compressor());
    let mut expected = elements.clone();
    expected.extend([100.0; 5]);
    assert_eq!(
        array.retrieve_array_subset_elements::<f32>(&array.subset_all())?,
        expected
    );

    // modify the reopened array
    let column = [-1.0f32; 7];
    array.set_slice(
        &[0, 4],
        &[7, 5],
        ndchunk::bytemuck::cast_slice(&column),
        &[7, 1],
    )?;
    array.append_elements(&[-2.0f32; 7], 1)?;
    array.free()?;

    let array = Array::open_with_threads(&backend, 1)?;
    assert_eq!(array.shape(), &[7, 6]);
    let mut dest = vec![0u8; 7 * 2 * 4];
    array.get_slice(&[0, 4], &[7, 6], &mut dest, &[7, 2])?;
    let dest: Vec<f32> = ndchunk::bytemuck::pod_collect_to_vec(&dest);
    assert_eq!(dest, [-1.0f32, -2.0].repeat(7));
    let mut dest = vec![0u8; 4];
    array.get_slice(&[1, 1], &[2, 2], &mut dest, &[1, 1])?;
    assert_eq!(dest, 6.0f32.to_ne_bytes());
    Ok(())
}

#[test]
fn persistence_contiguous_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    persist_and_reopen(StorageBackend::ContiguousFile(
        dir.path().join("array.ndc"),
    ))
}

#[test]
fn persistence_directory() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    persist_and_reopen(StorageBackend::Directory(dir.path().join("array")))
}

#[test]
fn persistence_dropped_array() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let backend = StorageBackend::Directory(dir.path().join("array"));
    {
        let params = ArrayParams::new(vec![3, 3], 1)?;
        let storage = StorageSpec::new(vec![2, 2], vec![1, 2], backend.clone())?;
        let mut array = Array::new_full(&params, &storage, &FillValue::from(9u8))?;
        array.append(&[1, 2, 3], 0)?;
    }
    let array = Array::open(&backend)?;
    assert_eq!(
        array.retrieve_array_subset(&array.subset_all())?,
        vec![9, 9, 9, 9, 9, 9, 9, 9, 9, 1, 2, 3]
    );
    Ok(())
}

#[test]
fn persistence_path_exists() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    for backend in [
        StorageBackend::ContiguousFile(dir.path().join("array.ndc")),
        StorageBackend::Directory(dir.path().join("array")),
    ] {
        let params = ArrayParams::new(vec![4], 2)?;
        let mut storage = StorageSpec::new(vec![2], vec![2], backend.clone())?;
        storage.set_compressor(Compressor::None);
        Array::new_empty(&params, &storage)?.free()?;

        let err = Array::new_empty(&params, &storage).unwrap_err();
        assert_eq!(err.kind(), ArrayErrorKind::InvalidArgument);
        assert!(matches!(
            err,
            ArrayCreateError::StorageError(StorageError::PathExists(_))
        ));

        // the existing array is untouched
        assert_eq!(Array::open(&backend)?.shape(), &[4]);

        storage.set_remove_existing(true);
        let array = Array::new_full(&params, &storage, &FillValue::from(3u16))?;
        assert_eq!(
            array.retrieve_array_subset_elements::<u16>(&array.subset_all())?,
            vec![3; 4]
        );
    }
    Ok(())
}

#[test]
fn persistence_open_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    assert_eq!(
        Array::open(&StorageBackend::Memory).unwrap_err().kind(),
        ArrayErrorKind::InvalidArgument
    );
    assert!(Array::open(&StorageBackend::Directory(dir.path().join("missing"))).is_err());
    let path = dir.path().join("not_an_array");
    std::fs::write(&path, b"not an array")?;
    assert!(Array::open(&StorageBackend::ContiguousFile(path)).is_err());
    Ok(())
}

#[cfg(feature = "crc32c")]
#[test]
fn persistence_contiguous_file_failed_write() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("array.ndc");
    let backend = StorageBackend::ContiguousFile(path.clone());
    let params = ArrayParams::new(vec![6], 1)?;
    let mut storage = StorageSpec::new(vec![3], vec![3], backend.clone())?;
    storage.set_compressor(Compressor::None);
    Array::new_from_bytes(&params, &storage, &[0, 1, 2, 3, 4, 5])?.free()?;

    // corrupt the checksum of the second chunk, the record just before the header
    let mut file = std::fs::read(&path)?;
    let footer = file.len() - 16;
    let header_offset = u64::from_le_bytes(file[footer..footer + 8].try_into()?);
    file[usize::try_from(header_offset)? - 1] ^= 0xff;
    std::fs::write(&path, &file)?;
    let len = file.len() as u64;

    // the first chunk is rewritten before the second fails to decode
    let mut array = Array::open(&backend)?;
    assert!(array.set_slice(&[2], &[4], &[20, 30], &[2]).is_err());
    assert_eq!(array.shape(), &[6]);
    array.free()?;
    assert_eq!(std::fs::metadata(&path)?.len(), len);

    let mut array = Array::open(&backend)?;
    assert_eq!(array.shape(), &[6]);
    let mut dest = [0u8; 3];
    array.get_slice(&[0], &[3], &mut dest, &[3])?;
    assert_eq!(dest, [0, 1, 2]);
    array.set_slice(&[0], &[2], &[10, 11], &[2])?;
    array.free()?;

    let array = Array::open(&backend)?;
    array.get_slice(&[0], &[3], &mut dest, &[3])?;
    assert_eq!(dest, [10, 11, 2]);
    Ok(())
}

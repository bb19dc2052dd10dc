pub fn cast_slice<T>(slice: &[T]) -> &[u8] {
    assert!(size_of::<T>() > 0, "Cannot cast a zero-sized type");
    unsafe { std::slice::from_raw_parts(slice.as_ptr() as *const u8, size_of_val(slice)) }
}

pub fn as_bytes<T>(value: &T) -> &[u8] {
    cast_slice(std::slice::from_ref(value))
}

fn fill(len: usize) -> *mut u8 {
    let ptr = heapguard::calloc!(len, 1);
    for i in 0..len {
        unsafe { *ptr.add(i) = b'a' + (i % 26) as u8 };
    }
    ptr
}

fn scratch() {
    let ptr = heapguard::malloc!(64);
    heapguard::free!(ptr);
}

#[heapguard::main(format = "table", top = 3)]
fn main() {
    let mut kept = Vec::new();
    for i in 0..100 {
        scratch();
        let buf = fill(i + 1);
        if i % 25 == 0 {
            kept.push(buf);
        } else {
            heapguard::free!(buf);
        }
    }

    // Every 25th buffer stays live and shows up as a leak.
    println!("kept {} buffers", kept.len());
}

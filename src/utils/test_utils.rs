//! Test utilities for assembler and VM testing.

#[cfg(test)]
pub mod utils {
    use crate::assembler::assemble;
    use crate::assembler::bytecode::serialize_bytecode;
    use crate::virtual_machine::vm::Vm;
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    /// Writes `contents` to `dir/name` and returns the full path.
    pub fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Assembles `source` and loads the result into a fresh VM.
    pub fn load_source(source: &str) -> Vm {
        let program = assemble(source, "test.casm", &[]).unwrap();
        let bytes = serialize_bytecode(&program, true).unwrap();
        let mut vm = Vm::new();
        vm.load(&bytes).unwrap();
        vm
    }

    /// In-memory writer whose contents stay readable after it is handed to the VM.
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> Vec<u8> {
            self.0.borrow().clone()
        }

        pub fn text(&self) -> String {
            String::from_utf8(self.contents()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Writer that fails every call.
    pub struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("broken pipe"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::other("broken pipe"))
        }
    }
}

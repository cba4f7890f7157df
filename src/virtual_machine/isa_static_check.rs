//! Pins the instruction table. Kind identifiers and operand kinds are part of the
//! bytecode format, so any edit to the table has to update this listing too.

use crate::virtual_machine::isa::Instruction;

const EXPECTED: &str = "\
0 noop
1 push Word
2 swap Index
3 dup
4 over Index
5 drop
6 add
7 sub
8 mul
9 imul
10 div
11 idiv
12 mod
13 imod
14 fadd
15 fsub
16 fmul
17 fdiv
18 and
19 or
20 xor
21 shl
22 shr
23 not
24 cmp
25 icmp
26 fcmp
27 jmp Addr
28 jz Addr
29 jnz Addr
30 jg Addr
31 jl Addr
32 jge Addr
33 jle Addr
34 call Addr
35 ret
36 read
37 iread
38 fread
39 write
40 iwrite
41 fwrite
42 syscall SysNo
43 print
44 halt
";

macro_rules! listing {
    (
        $( $(#[$doc:meta])* $name:ident = $id:literal, $mnemonic:literal => [ $( $field:ident : $kind:ident ),* $(,)? ] ),* $(,)?
    ) => {{
        let mut out = String::new();
        $(
            assert_eq!(Instruction::$name.id(), $id);
            out.push_str(&format!("{} {}", $id, $mnemonic));
            $( out.push_str(concat!(" ", stringify!($kind))); )*
            out.push('\n');
        )*
        out
    }};
}

#[test]
fn instruction_table_is_pinned() {
    let listing = crate::for_each_instruction!(listing);
    for (line, (actual, expected)) in listing.lines().zip(EXPECTED.lines()).enumerate() {
        assert_eq!(actual, expected, "instruction table differs at kind {line}");
    }
    assert_eq!(listing.lines().count(), EXPECTED.lines().count());
}

#[test]
fn listing_agrees_with_runtime_table() {
    for (instruction, line) in Instruction::ALL.iter().zip(EXPECTED.lines()) {
        let mut parts = line.split(' ');
        assert_eq!(parts.next(), Some(instruction.id().to_string().as_str()));
        assert_eq!(parts.next(), Some(instruction.mnemonic()));
        assert_eq!(parts.next().is_some(), instruction.has_operand());
    }
}

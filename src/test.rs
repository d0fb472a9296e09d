use rstest::rstest;

use crate::compile_str;

// End-to-end checks over the emitted assembly text. The assembler and
// linker are downstream collaborators, so these tests pin the observable
// shape of the output rather than executing it.

#[rstest]
#[case("int main() { return 42; }")]
#[case("int main() { int a = 3; int b = 4; return a * b + a - b; }")]
#[case("int f(int n) { if (n <= 1) return n; return f(n - 1) + f(n - 2); } int main() { return f(10); }")]
#[case("struct P { int x; int y; }; int main() { struct P p; p.x = 3; p.y = 4; return p.x + p.y; }")]
#[case("int a[5] = {1, 2, 3, 4, 5}; int main() { int s = 0; for (int i = 0; i < 5; i = i + 1) s = s + a[i]; return s; }")]
#[case("int main() { int i = 0; switch (3) { case 1: i = 1; break; case 3: i = 30; case 4: i = i + 4; break; default: i = 99; } return i; }")]
#[case("int main() { int i = 0; do { i = i + 1; } while (i < 10); return i; }")]
#[case("int main() { int a = 1; a += 2; a -= 1; a *= 6; a /= 3; return a; }")]
#[case("int main() { int x = 3; return x == 3 ? 1 : 2; }")]
#[case("int main() { return ({ int v = 2; v * 3; }); }")]
#[case("typedef struct node { struct node *next; int val; } Node; int main() { Node n; n.val = 7; return n.val; }")]
#[case("int main() { char *s = \"hi\"; return s[1]; }")]
#[case("enum Color { RED, GREEN = 4, BLUE }; int main() { return BLUE; }")]
#[case("long fact(long n) { return n <= 1 ? 1 : n * fact(n - 1); } int main() { return fact(5) & 0xff; }")]
fn representative_programs_compile(#[case] src: &str) {
    let asm = compile_str(src).unwrap();
    assert!(asm.starts_with(".intel_syntax noprefix\n"));
    assert!(asm.contains(".data\n"));
    assert!(asm.contains(".text\n"));
    assert!(asm.contains(".globl main"));
}

#[test]
fn return_42_pushes_the_literal() {
    let asm = compile_str("int main() { return 42; }").unwrap();
    assert!(asm.contains("\tpush 42\n"));
    assert!(asm.contains("\tjmp .L.return.main\n"));
}

#[test]
fn empty_function_is_prologue_label_epilogue() {
    let asm = compile_str("int main() {}").unwrap();
    insta::assert_snapshot!(asm, @r"
.intel_syntax noprefix
.data
.text
.globl main
main:
	push rbp
	mov rbp, rsp
	sub rsp, 0
.L.return.main:
	mov rsp, rbp
	pop rbp
	ret
");
}

#[test]
fn data_section_shape_for_a_string_global() {
    let asm = compile_str("char msg[6] = \"hello\"; int main() { return 0; }").unwrap();
    insta::assert_snapshot!(asm, @r#"
.intel_syntax noprefix
.data
msg:
	.string "hello"
	.zero 0
.text
.globl main
main:
	push rbp
	mov rbp, rsp
	sub rsp, 0
	push 0
	pop rax
	jmp .L.return.main
.L.return.main:
	mov rsp, rbp
	pop rbp
	ret
"#);
}

#[rstest]
#[case(2147483647, "\tpush 2147483647\n")]
#[case(2147483648, "\tmovabs rax, 2147483648\n")]
fn integer_literal_width_boundary(#[case] n: i64, #[case] expected: &str) {
    let asm = compile_str(&format!("long main() {{ return {n}; }}")).unwrap();
    assert!(asm.contains(expected));
}

#[test]
fn global_array_initializer_serializes_element_wise() {
    let asm =
        compile_str("int a[5] = {1, 2, 3, 4, 5}; int main() { return 0; }").unwrap();
    assert!(asm.contains(
        "a:\n\t.long 1\n\t.long 2\n\t.long 3\n\t.long 4\n\t.long 5\n"
    ));
}

#[test]
fn short_global_array_initializer_zero_fills() {
    let asm = compile_str("int a[4] = {1, 2}; int main() { return 0; }").unwrap();
    assert!(asm.contains("a:\n\t.long 1\n\t.long 2\n\t.zero 4\n\t.zero 4\n"));
}

#[test]
fn short_string_initializer_is_nul_padded_to_declared_length() {
    let asm = compile_str("char msg[8] = \"hi\"; int main() { return 0; }").unwrap();
    // `.string` stores 3 bytes, the pad covers the remaining 5
    assert!(asm.contains("msg:\n\t.string \"hi\"\n\t.zero 5\n"));
}

#[test]
fn struct_global_initializer_pads_between_members() {
    let asm = compile_str(
        "struct S { char c; long l; }; struct S s = {1, 2}; int main() { return 0; }",
    )
    .unwrap();
    assert!(asm.contains("s:\n\t.byte 1\n\t.zero 7\n\t.quad 2\n"));
}

#[test]
fn global_pointer_to_global_uses_a_quad_label() {
    let asm = compile_str("int x; int *p = &x; int main() { return *p; }").unwrap();
    assert!(asm.contains("p:\n\t.quad x\n"));
}

#[test]
fn local_array_initializer_zero_fills_missing_elements() {
    let asm =
        compile_str("int main() { int a[4] = {1, 2}; return a[3]; }").unwrap();
    // four stores through element addresses: two literals plus two zeros
    assert_eq!(asm.matches("\timul rdi, 4\n").count(), 5);
}

#[test]
fn switch_emits_the_compare_table_then_bodies_in_source_order() {
    let asm = compile_str(
        "int main() { int i = 0; switch (3) { case 1: i = 1; break; case 3: i = 30; case 4: i = i + 4; break; default: i = 99; } return i; }",
    )
    .unwrap();
    let table = [
        "\tcmp rax, 1\n\tje .L.case.0.0\n",
        "\tcmp rax, 3\n\tje .L.case.0.1\n",
        "\tcmp rax, 4\n\tje .L.case.0.2\n",
        "\tjmp .L.case.0.3\n",
    ];
    let mut at = 0;
    for part in table {
        let found = asm[at..].find(part).unwrap();
        at += found + part.len();
    }
    // fall-through: the body of case 3 is immediately followed by case 4's
    let c3 = asm.find(".L.case.0.1:").unwrap();
    let c4 = asm.find(".L.case.0.2:").unwrap();
    assert!(c3 < c4);
    assert!(asm.contains(".L.break.0:"));
}

#[test]
fn switch_without_default_jumps_to_break() {
    let asm = compile_str(
        "int main() { switch (9) { case 1: return 1; } return 0; }",
    )
    .unwrap();
    assert!(asm.contains("\tjmp .L.break.0\n"));
}

#[test]
fn nested_loops_keep_their_own_break_and_continue_labels() {
    let asm = compile_str(
        "int main() { int s = 0; for (int i = 0; i < 3; i = i + 1) { int j = 0; while (j < 3) { j = j + 1; if (j == 2) continue; if (j == 3) break; s = s + 1; } } return s; }",
    )
    .unwrap();
    // for-loop is label 0, while-loop is label 1; both jumps belong to the
    // inner while
    assert!(asm.contains("\tjmp .L.continue.1\n"));
    assert!(asm.contains("\tjmp .L.break.1\n"));
    assert!(asm.contains(".L.begin.0:"));
}

#[test]
fn member_access_adds_the_member_offset() {
    let asm = compile_str(
        "struct P { int x; int y; }; int main() { struct P p; p.y = 4; return p.y; }",
    )
    .unwrap();
    assert!(asm.contains("\tadd rax, 4\n"));
}

#[test]
fn arrow_dereferences_then_offsets() {
    let asm = compile_str(
        "struct P { int x; int y; }; int main() { struct P p; struct P *q; q = &p; q->y = 2; return q->y; }",
    )
    .unwrap();
    assert!(asm.contains("\tadd rax, 4\n"));
}

#[test]
fn sizeof_reflects_parameter_decay_but_not_local_arrays() {
    let asm = compile_str(
        "int f(int a[3]) { return sizeof(a); } int main() { int b[3]; return sizeof(b); }",
    )
    .unwrap();
    assert!(asm.contains("\tpush 8\n"));
    assert!(asm.contains("\tpush 12\n"));
}

#[test]
fn char_literals_compile_to_their_code_points() {
    let asm = compile_str("int main() { return 'A'; }").unwrap();
    assert!(asm.contains("\tpush 65\n"));
}

#[test]
fn object_macros_expand_before_parsing() {
    let asm = compile_str("#define ANSWER 42\nint main() { return ANSWER; }").unwrap();
    assert!(asm.contains("\tpush 42\n"));
}

#[test]
fn function_macros_expand_with_arguments() {
    let asm = compile_str(
        "#define MAX(a, b) ((a) > (b) ? (a) : (b))\nint main() { return MAX(2, 3); }",
    )
    .unwrap();
    assert!(asm.contains(".L.ternary.0.rhs:"));
}

#[test]
fn stack_effects_balance_in_straight_line_code() {
    let asm =
        compile_str("int main() { int a = 1; int b = 2; int c = 3; return a + b + c; }").unwrap();
    let pushes = asm.matches("\tpush").count();
    let pops = asm.matches("\tpop").count();
    let discards = asm.matches("\tadd rsp, 8\n").count();
    assert_eq!(pushes, pops + discards);
}

#[test]
fn prefix_and_postfix_update_forms_differ_only_in_the_left_behind_value() {
    let pre = compile_str("int main() { int i = 5; return ++i; }").unwrap();
    let post = compile_str("int main() { int i = 5; return i++; }").unwrap();
    // the postfix form restores the pre-value after the store
    let tail_of = |s: &str| {
        let at = s.find("\tmov [rax], edi").unwrap();
        s[at..].matches("\tsub rax, 1\n").count()
    };
    assert_eq!(tail_of(&pre), 0);
    assert_eq!(tail_of(&post), 1);
    assert!(pre.contains("\tpush qword ptr [rsp]\n"));
}

#[test]
fn pointer_increment_steps_by_element_size() {
    let asm = compile_str("int main() { long a[2]; long *p; p = a; p++; return 0; }").unwrap();
    assert!(asm.contains("\tadd rax, 8\n"));
}

#[test]
fn function_scope_statics_are_emitted_with_unique_labels() {
    let asm = compile_str(
        "int bump() { static int n = 5; n = n + 1; return n; } int main() { return bump(); }",
    )
    .unwrap();
    assert!(asm.contains("n.0:\n\t.long 5\n"));
    assert!(asm.contains("\tpush offset n.0\n"));
}

#[test]
fn casts_truncate_and_sign_extend() {
    let asm = compile_str("int main() { return (char)300; }").unwrap();
    assert!(asm.contains("\tmovsx rax, al\n"));

    let asm = compile_str("int main() { long l; l = 70000; return (short)l; }").unwrap();
    assert!(asm.contains("\tmovsx rax, ax\n"));

    let asm = compile_str("int main() { return (_Bool)5; }").unwrap();
    assert!(asm.contains("\tsetne al\n"));
}

#[rstest]
#[case("int main() { return 1 << 4; }", "\tsal rax, cl\n")]
#[case("int main() { return 64 >> 2; }", "\tsar rax, cl\n")]
#[case("int main() { int a = 1; a <<= 3; return a; }", "\tsal rax, cl\n")]
#[case("int main() { int a = 64; a >>= 3; return a; }", "\tsar rax, cl\n")]
fn shifts_go_through_cl(#[case] src: &str, #[case] expected: &str) {
    let asm = compile_str(src).unwrap();
    assert!(asm.contains(expected));
}

#[test]
fn logical_operators_normalize_their_result() {
    let asm = compile_str("int main() { int a = 2; return a || 0; }").unwrap();
    assert!(asm.contains(".L.true.0:"));
    assert!(asm.contains("\tmovzb rax, al\n"));

    let asm = compile_str("int main() { int a = 2; return a && 3; }").unwrap();
    assert!(asm.contains(".L.false.0:"));
    assert!(asm.contains("\tmovzb rax, al\n"));

    let asm = compile_str("int main() { return !42; }").unwrap();
    assert!(asm.contains("\tsete al\n\tmovzb rax, al\n"));
}

#[test]
fn do_while_tests_the_condition_at_the_bottom() {
    let asm =
        compile_str("int main() { int i = 0; do { i = i + 1; } while (i < 3); return i; }")
            .unwrap();
    let body_label = asm.find(".L.do.while.0:").unwrap();
    let test_jump = asm.find("\tjne .L.do.while.0\n").unwrap();
    assert!(body_label < test_jump);
    assert!(asm.contains(".L.continue.0:"));
}

#[test]
fn designated_initializers_fill_the_named_member() {
    let asm = compile_str(
        "struct P { int x; int y; int z; }; struct P p = {.z = 9}; int main() { return p.z; }",
    )
    .unwrap();
    // x and y are zero-filled, z carries the value
    assert!(asm.contains("p:\n\t.zero 4\n\t.zero 4\n\t.long 9\n"));
}

#[test]
fn enum_constants_are_valid_case_labels() {
    let asm = compile_str(
        "enum Color { RED, GREEN, BLUE }; int main() { switch (GREEN) { case RED: return 1; case GREEN: return 2; } return 0; }",
    )
    .unwrap();
    assert!(asm.contains("\tcmp rax, 0\n\tje .L.case.0.0\n"));
    assert!(asm.contains("\tcmp rax, 1\n\tje .L.case.0.1\n"));
}

#[test]
fn global_array_name_initializes_a_pointer_with_its_label() {
    let asm = compile_str("int a[3]; int *p = a; int main() { return *p; }").unwrap();
    assert!(asm.contains("p:\n\t.quad a\n"));
}

#[rstest]
#[case("sizeof(char)", 1)]
#[case("sizeof(short)", 2)]
#[case("sizeof(int)", 4)]
#[case("sizeof(long)", 8)]
#[case("sizeof(int*)", 0)] // stars are not part of the sizeof(type) form
fn sizeof_of_type_names(#[case] expr: &str, #[case] expected: i64) {
    let src = format!("int main() {{ return {expr}; }}");
    match compile_str(&src) {
        Ok(asm) => assert!(asm.contains(&format!("\tpush {expected}\n"))),
        Err(_) => assert_eq!(expected, 0),
    }
}

#[test]
fn includes_compile_relative_to_the_including_file() {
    let dir = std::env::temp_dir().join(format!("rcc-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("lib.h"), "#define SEVEN 7\nint helper();\n").unwrap();
    std::fs::write(
        dir.join("main.c"),
        "#include \"lib.h\"\nint main() { return SEVEN + helper(); }\n",
    )
    .unwrap();
    let asm = crate::compile(&dir.join("main.c")).unwrap();
    assert!(asm.contains("\tpush 7\n"));
    assert!(asm.contains("\tcall helper\n"));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn scopes_shadow_by_innermost_declaration() {
    let asm = compile_str(
        "int main() { int a = 1; { long a; a = 2; } return a; }",
    )
    .unwrap();
    // the inner `a` gets its own 8-byte slot and store width
    assert!(asm.contains("\tmov [rax], rdi\n"));
    assert!(asm.contains("\tmov [rax], edi\n"));
}

#[test]
fn wrong_code_fails_instead_of_emitting_partial_assembly() {
    for src in [
        "int main() { return 1 }",
        "int main() { return x; }",
        "int main() { int a; a -> x; return 0; }",
        "int main() { struct nope s; return 0; }",
        "int main() { int a[x]; return 0; }",
    ] {
        assert!(compile_str(src).is_err(), "expected failure: {src}");
    }
}

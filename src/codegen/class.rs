use super::runtime::{class_delete, class_new, class_struct, int_literal};
use super::{CodegenError, CodegenResult};
use crate::ir::ClassDef;

/// Instances are heap structs of native integer fields.
pub(super) fn emit_struct(class: &ClassDef, output: &mut String) {
    output.push_str(&format!("{} {{\n", class_struct(&class.name)));
    if class.fields.is_empty() {
        output.push_str("    char pcc_unused;\n");
    }
    for field in &class.fields {
        output.push_str(&format!("    long long {};\n", field.name));
    }
    output.push_str("};\n");
}

pub(super) fn emit_lifecycle_prototypes(class: &ClassDef, output: &mut String) {
    let record = class_struct(&class.name);
    output.push_str(&format!(
        "static {record} *{}(void);\n",
        class_new(&class.name)
    ));
    output.push_str(&format!(
        "static void {}({record} *self);\n",
        class_delete(&class.name)
    ));
}

/// Allocation with every field set to its default, and the matching
/// release. `__init__` runs separately, at the construction site.
pub(super) fn emit_lifecycle(class: &ClassDef, output: &mut String) -> CodegenResult<()> {
    let record = class_struct(&class.name);
    output.push_str(&format!(
        "static {record} *{}(void) {{\n",
        class_new(&class.name)
    ));
    output.push_str(&format!(
        "    {record} *self = ({record} *)malloc(sizeof({record}));\n"
    ));
    output.push_str("    if (self == NULL) {\n");
    output.push_str("        fprintf(stderr, \"pcc: out of memory\\n\");\n");
    output.push_str("        exit(1);\n");
    output.push_str("    }\n");
    for field in &class.fields {
        let value = field.default.parse::<i64>().map_err(|_| {
            CodegenError::unsupported(
                format!(
                    "default of field '{}.{}' does not fit in a native integer",
                    class.name, field.name
                ),
                class.line,
            )
        })?;
        output.push_str(&format!("    self->{} = {};\n", field.name, int_literal(value)));
    }
    output.push_str("    return self;\n}\n\n");

    output.push_str(&format!(
        "static void {}({record} *self) {{\n    free(self);\n}}\n",
        class_delete(&class.name)
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FieldDef;
    use indoc::indoc;

    fn point() -> ClassDef {
        ClassDef {
            name: "Point".to_string(),
            methods: Vec::new(),
            fields: vec![
                FieldDef {
                    name: "x".to_string(),
                    default: "1".to_string(),
                },
                FieldDef {
                    name: "y".to_string(),
                    default: "-2".to_string(),
                },
            ],
            line: 1,
        }
    }

    #[test]
    fn emits_struct_and_lifecycle() {
        let mut output = String::new();
        emit_struct(&point(), &mut output);
        emit_lifecycle(&point(), &mut output).expect("lifecycle");
        assert_eq!(
            output,
            indoc! {r#"
                struct pcc_class_Point {
                    long long x;
                    long long y;
                };
                static struct pcc_class_Point *pcc_new_Point(void) {
                    struct pcc_class_Point *self = (struct pcc_class_Point *)malloc(sizeof(struct pcc_class_Point));
                    if (self == NULL) {
                        fprintf(stderr, "pcc: out of memory\n");
                        exit(1);
                    }
                    self->x = 1LL;
                    self->y = (-2LL);
                    return self;
                }

                static void pcc_delete_Point(struct pcc_class_Point *self) {
                    free(self);
                }
            "#}
        );
    }

    #[test]
    fn empty_classes_get_a_placeholder_member() {
        let class = ClassDef {
            name: "Empty".to_string(),
            methods: Vec::new(),
            fields: Vec::new(),
            line: 3,
        };
        let mut output = String::new();
        emit_struct(&class, &mut output);
        assert!(output.contains("char pcc_unused;"));
    }

    #[test]
    fn rejects_oversized_field_defaults() {
        let mut class = point();
        class.fields[0].default = "99999999999999999999".to_string();
        let mut output = String::new();
        let err = emit_lifecycle(&class, &mut output).expect_err("too large");
        assert_eq!(err.line(), 1);
    }
}

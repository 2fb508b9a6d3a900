const INDENT: &str = "    ";

/// Line buffer for one C function body.
///
/// Lines are stored with their nesting level rather than pre-rendered so a
/// run of already emitted lines can later be wrapped in a block.
#[derive(Debug, Default)]
pub struct Writer {
    lines: Vec<(usize, String)>,
    level: usize,
}

impl Writer {
    pub fn new(level: usize) -> Self {
        Self {
            lines: Vec::new(),
            level,
        }
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push((self.level, line.into()));
    }

    /// Labels sit one level left of the code they mark.
    pub fn push_label(&mut self, label: &str) {
        self.lines
            .push((self.level.saturating_sub(1), format!("{label}: ;")));
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    pub fn open(&mut self, header: impl Into<String>) {
        let header = header.into();
        self.push_line(format!("{header} {{"));
        self.indent();
    }

    pub fn close(&mut self) {
        self.dedent();
        self.push_line("}");
    }

    /// Position that a later [`Writer::wrap`] or [`Writer::insert`] refers to.
    pub fn mark(&mut self) -> usize {
        self.lines.len()
    }

    pub fn insert(&mut self, mark: usize, line: impl Into<String>) {
        self.lines.insert(mark, (self.level, line.into()));
    }

    /// Wraps everything emitted since `mark` in `header {` ... `}`, placing
    /// `prologue` lines at the top of the block and `epilogue` lines at the
    /// bottom.
    pub fn wrap(&mut self, mark: usize, header: &str, prologue: &[String], epilogue: &[String]) {
        let inner = self.level + 1;
        for (level, _) in &mut self.lines[mark..] {
            *level += 1;
        }
        let mut opening = Vec::with_capacity(prologue.len() + 1);
        let brace = if header.is_empty() {
            "{".to_string()
        } else {
            format!("{header} {{")
        };
        opening.push((self.level, brace));
        opening.extend(prologue.iter().map(|line| (inner, line.clone())));
        self.lines.splice(mark..mark, opening);
        for line in epilogue {
            self.lines.push((inner, line.clone()));
        }
        self.lines.push((self.level, "}".to_string()));
    }

    pub fn render_into(&self, output: &mut String) {
        for (level, line) in &self.lines {
            for _ in 0..*level {
                output.push_str(INDENT);
            }
            output.push_str(line);
            output.push('\n');
        }
    }

    #[cfg(test)]
    pub fn render(&self) -> String {
        let mut output = String::new();
        self.render_into(&mut output);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn wraps_emitted_lines_in_a_block() {
        let mut writer = Writer::new(1);
        writer.push_line("before();");
        let mark = writer.mark();
        writer.push_line("use(pcc_t1);");
        writer.wrap(
            mark,
            "",
            &["rt_int pcc_t1;".to_string()],
            &["rt_int_clear(&pcc_t1);".to_string()],
        );
        writer.push_line("after();");
        assert_eq!(
            writer.render(),
            indoc! {"
                    before();
                    {
                        rt_int pcc_t1;
                        use(pcc_t1);
                        rt_int_clear(&pcc_t1);
                    }
                    after();
            "}
        );
    }

    #[test]
    fn labels_are_outdented() {
        let mut writer = Writer::new(1);
        writer.push_label("pcc_L_while_1");
        writer.open("if (x)");
        writer.push_line("y();");
        writer.close();
        assert_eq!(
            writer.render(),
            "pcc_L_while_1: ;\n    if (x) {\n        y();\n    }\n"
        );
    }
}

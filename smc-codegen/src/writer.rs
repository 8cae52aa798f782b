//! Indentation-aware text buffer.

/// Accumulates generated source one line at a time.
#[derive(Debug)]
pub struct CodeWriter {
    out: String,
    level: usize,
    unit: String,
}

impl CodeWriter {
    pub fn new(indent_width: usize) -> Self {
        Self {
            out: String::new(),
            level: 0,
            unit: " ".repeat(indent_width),
        }
    }

    /// Writes one line at the current indentation.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.level {
                self.out.push_str(&self.unit);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Writes `header`, then runs `body` one level deeper.
    pub fn block(&mut self, header: impl AsRef<str>, body: impl FnOnce(&mut Self)) {
        self.line(header);
        self.indent();
        body(self);
        self.dedent();
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks() {
        let mut w = CodeWriter::new(2);
        w.block("class A:", |w| {
            w.block("def f(self):", |w| w.line("pass"));
            w.line("");
            w.line("x = 1");
        });
        w.line("done");
        assert_eq!(
            w.finish(),
            "class A:\n  def f(self):\n    pass\n\n  x = 1\ndone\n"
        );
    }

    #[test]
    fn test_dedent_saturates() {
        let mut w = CodeWriter::new(4);
        w.dedent();
        w.line("a");
        assert_eq!(w.finish(), "a\n");
    }
}

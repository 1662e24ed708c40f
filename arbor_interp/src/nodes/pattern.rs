//! Pattern-match call sites.
//!
//! Evaluates an input string, a pattern string, and a flag string, runs
//! the pattern through the site's compile cache, and produces whether
//! the input matches. Compilation cost is paid once per distinct
//! `(pattern, flags)` pair until the site's cache bound is exceeded.

use std::sync::Arc;

use arbor_core::intern::InternedString;
use arbor_core::{LanguageError, Value};

use crate::compile_cache::{CompileCache, PatternCompiler};
use crate::config::InterpConfig;
use crate::frame::Frame;
use crate::node::{ChildSlot, Node, NodeHeader, NodeRef};
use crate::specialize::DeoptSink;

#[derive(Debug)]
pub struct MatchPatternNode {
    header: NodeHeader,
    input: ChildSlot,
    pattern: ChildSlot,
    flags: ChildSlot,
    cache: CompileCache,
}

impl MatchPatternNode {
    pub fn new(
        input: NodeRef,
        pattern: NodeRef,
        flags: NodeRef,
        compiler: Arc<dyn PatternCompiler>,
        config: &InterpConfig,
        deopt: Arc<dyn DeoptSink>,
    ) -> Self {
        Self {
            header: NodeHeader::new(),
            input: ChildSlot::new(input),
            pattern: ChildSlot::new(pattern),
            flags: ChildSlot::new(flags),
            cache: CompileCache::new(compiler, config.cache_limit, config.keep_all_compiled, deopt),
        }
    }

    pub fn boxed(
        input: NodeRef,
        pattern: NodeRef,
        flags: NodeRef,
        compiler: Arc<dyn PatternCompiler>,
        config: &InterpConfig,
        deopt: Arc<dyn DeoptSink>,
    ) -> NodeRef {
        Arc::new(Self::new(input, pattern, flags, compiler, config, deopt))
    }

    /// The site's cache, for tuning and tests.
    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    fn expect_str(value: Value, role: &str) -> Result<InternedString, LanguageError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(LanguageError::type_error(format!(
                "{} must be a string, got {}",
                role,
                other.type_name()
            ))),
        }
    }
}

impl Node for MatchPatternNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let input = Self::expect_str(self.input.get().execute(frame)?, "match input")?;
        let pattern = Self::expect_str(self.pattern.get().execute(frame)?, "pattern")?;
        let flags = Self::expect_str(self.flags.get().execute(frame)?, "pattern flags")?;

        let compiled = self.cache.get_or_compile(&pattern, &flags)?;
        Ok(Value::bool(compiled.is_match(input.as_str())))
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.input, &self.pattern, &self.flags]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile_cache::RegexCompiler;
    use crate::nodes::literal::ConstantNode;
    use crate::nodes::local::ReadLocalNode;
    use crate::slots::{SlotKind, SlotTable};
    use crate::specialize::NullDeoptSink;
    use arbor_core::intern::intern;

    fn str_const(s: &str) -> NodeRef {
        ConstantNode::boxed(Value::str(intern(s)))
    }

    fn match_site(input: NodeRef, pattern: NodeRef, config: &InterpConfig) -> MatchPatternNode {
        MatchPatternNode::new(
            input,
            pattern,
            str_const(""),
            Arc::new(RegexCompiler),
            config,
            Arc::new(NullDeoptSink),
        )
    }

    fn empty_frame() -> Frame {
        Frame::new(SlotTable::function_level().close())
    }

    #[test]
    fn test_match_result() {
        let cfg = InterpConfig::default();
        let node = match_site(str_const("hello42"), str_const("[a-z]+[0-9]+"), &cfg);
        assert_eq!(node.execute(&empty_frame()).unwrap().as_bool(), Some(true));

        let node = match_site(str_const("42"), str_const("^[a-z]+$"), &cfg);
        assert_eq!(node.execute(&empty_frame()).unwrap().as_bool(), Some(false));
    }

    #[test]
    fn test_repeated_pattern_hits_cache() {
        let cfg = InterpConfig::default();
        let node = match_site(str_const("aaa"), str_const("a+"), &cfg);
        let frame = empty_frame();
        node.execute(&frame).unwrap();
        node.execute(&frame).unwrap();
        assert_eq!(node.cache().entry_count(), 1);
        assert!(!node.cache().is_megamorphic());
    }

    #[test]
    fn test_dynamic_patterns_past_limit_still_correct() {
        let mut table = SlotTable::function_level();
        table.add_slot("p", 0, SlotKind::Value).unwrap();
        let frame = Frame::new(table.close());

        let cfg = InterpConfig::default().with_cache_limit(2);
        let node = match_site(str_const("target"), ReadLocalNode::boxed(0, 0), &cfg);

        for p in ["^t", "t$", "targ.t", "ge"] {
            frame.set(0, Value::str(intern(p)));
            assert_eq!(node.execute(&frame).unwrap().as_bool(), Some(true));
        }
        assert!(node.cache().is_megamorphic());

        // Megamorphic sites keep producing correct answers.
        frame.set(0, Value::str(intern("^x")));
        assert_eq!(node.execute(&frame).unwrap().as_bool(), Some(false));
    }

    #[test]
    fn test_bad_pattern_surfaces_syntax_error() {
        let cfg = InterpConfig::default();
        let node = match_site(str_const("x"), str_const("(oops"), &cfg);
        let err = node.execute(&empty_frame()).unwrap_err();
        assert!(matches!(err, LanguageError::Syntax { .. }));
    }

    #[test]
    fn test_non_string_operand_is_type_error() {
        let cfg = InterpConfig::default();
        let node = match_site(ConstantNode::boxed(Value::int(1)), str_const("a"), &cfg);
        let err = node.execute(&empty_frame()).unwrap_err();
        assert!(matches!(err, LanguageError::Type { .. }));
    }
}

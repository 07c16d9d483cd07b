use std::collections::HashMap;

use inkwell::{
    execution_engine::{ExecutionEngine, FunctionLookupError, JitFunction},
    module::Module,
    targets::{InitializationConfig, Target},
    OptimizationLevel,
};

use crate::runtime;

type NullaryFunc = unsafe extern "C" fn() -> f64;

#[derive(Debug, thiserror::Error)]
pub enum JitError {
    #[error("failed to initialize native target: {0}")]
    Target(String),
    #[error("failed to create execution engine: {0}")]
    Engine(String),
    #[error("failed to compile {0}")]
    Compile(String, #[source] FunctionLookupError),
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("{0} takes {1} arguments, cannot call it without any")]
    NotNullary(String, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(usize);

struct Unit<'ctx> {
    module: Module<'ctx>,
    engine: ExecutionEngine<'ctx>,
}

#[derive(Debug, Clone, Copy)]
struct Symbol {
    unit: UnitId,
    address: usize,
}

/// Compiles finished IR modules with MCJIT, one engine per unit.
///
/// Each unit is compiled eagerly when added. Body-less declarations are bound
/// to the most recent unit that defined the name, then to the runtime
/// builtins, and anything left is resolved by the engine against the process.
pub struct Jit<'ctx> {
    units: HashMap<UnitId, Unit<'ctx>>,
    symbols: HashMap<String, Symbol>,
    next_id: usize,
}

impl<'ctx> Jit<'ctx> {
    pub fn new() -> Result<Self, JitError> {
        ExecutionEngine::link_in_mc_jit();
        Target::initialize_native(&InitializationConfig::default()).map_err(JitError::Target)?;

        Ok(Self {
            units: HashMap::new(),
            symbols: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn add_unit(&mut self, module: Module<'ctx>) -> Result<UnitId, JitError> {
        let engine = module
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|e| JitError::Engine(e.to_string()))?;

        let builtins = runtime::builtins();
        let mut defined = Vec::new();
        for func in module.get_functions() {
            let name = func.get_name().to_string_lossy().into_owned();
            if func.count_basic_blocks() > 0 {
                defined.push(name);
            } else if let Some(symbol) = self.symbols.get(&name) {
                engine.add_global_mapping(&func, symbol.address);
            } else if let Some(&(_, address)) = builtins.iter().find(|(n, _)| *n == name) {
                engine.add_global_mapping(&func, address);
            }
        }

        let mut addresses = Vec::with_capacity(defined.len());
        for name in &defined {
            let address = engine
                .get_function_address(name)
                .map_err(|e| JitError::Compile(name.clone(), e))?;
            addresses.push(address);
        }

        let unit = UnitId(self.next_id);
        self.next_id += 1;
        for (name, address) in defined.into_iter().zip(addresses) {
            self.symbols.insert(name, Symbol { unit, address });
        }
        self.units.insert(unit, Unit { module, engine });

        Ok(unit)
    }

    /// Address of the most recently added definition of `name`.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).map(|symbol| symbol.address)
    }

    /// Drop a unit's code along with every symbol it still provides.
    pub fn remove_unit(&mut self, unit: UnitId) -> bool {
        self.symbols.retain(|_, symbol| symbol.unit != unit);
        self.units.remove(&unit).is_some()
    }

    pub fn call_nullary(&self, name: &str) -> Result<f64, JitError> {
        let unit = self
            .symbols
            .get(name)
            .and_then(|symbol| self.units.get(&symbol.unit))
            .ok_or_else(|| JitError::UnknownSymbol(name.to_string()))?;

        let params = unit
            .module
            .get_function(name)
            .map(|func| func.count_params())
            .unwrap_or(0);
        if params != 0 {
            return Err(JitError::NotNullary(name.to_string(), params));
        }

        let entry: JitFunction<NullaryFunc> = unsafe { unit.engine.get_function(name) }
            .map_err(|e| JitError::Compile(name.to_string(), e))?;

        Ok(unsafe { entry.call() })
    }
}

#[cfg(test)]
mod tests {
    use inkwell::context::Context;
    use pretty_assertions::assert_eq;

    use super::{Jit, JitError};
    use crate::ast::ANONYMOUS_FUNCTION;
    use crate::codegen::Codegen;
    use crate::parser::Parser;

    /// Lower and add each item as its own unit, evaluating top-level
    /// expressions and discarding them afterwards.
    fn run(source: &str) -> Vec<f64> {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        let mut jit = Jit::new().unwrap();
        let mut results = Vec::new();

        for node in Parser::parse_str(source).unwrap() {
            let func = codegen.compile_node(&node).unwrap();
            let anonymous = func.get_name().to_bytes() == ANONYMOUS_FUNCTION.as_bytes();
            let unit = jit.add_unit(codegen.take_module()).unwrap();
            if anonymous {
                results.push(jit.call_nullary(ANONYMOUS_FUNCTION).unwrap());
                assert!(jit.remove_unit(unit));
                assert_eq!(jit.lookup(ANONYMOUS_FUNCTION), None);
            }
        }

        results
    }

    #[test]
    fn evaluates_arithmetic() {
        assert_eq!(run("1 + 2 * 3; (1 + 2) * 3; 10 - 4 - 3"), vec![7.0, 9.0, 3.0]);
    }

    #[test]
    fn comparison_yields_one_or_zero() {
        assert_eq!(run("1 < 2; 2 < 1; 1 < 1"), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn calls_across_units() {
        let source = "def add(a b) a + b; def twice(x) add(x, x); twice(add(1, 2)) * 2";
        assert_eq!(run(source), vec![12.0]);
    }

    #[test]
    fn anonymous_units_do_not_collide() {
        assert_eq!(run("def f() 1; f(); f() + 1; f() * 5"), vec![1.0, 2.0, 5.0]);
    }

    #[test]
    fn builtins_resolve() {
        assert_eq!(run("extern printd(x); printd(42) + 1"), vec![1.0]);
    }

    #[test]
    fn lookup_and_arity_checks() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        let mut jit = Jit::new().unwrap();

        for node in Parser::parse_str("def id(x) x").unwrap() {
            codegen.compile_node(&node).unwrap();
        }
        jit.add_unit(codegen.take_module()).unwrap();

        assert!(jit.lookup("id").is_some());
        assert!(matches!(jit.call_nullary("id"), Err(JitError::NotNullary(_, 1))));
        assert!(matches!(jit.call_nullary("missing"), Err(JitError::UnknownSymbol(_))));
    }
}

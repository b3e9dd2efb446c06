//! SIL pass pipeline
//!
//! Runs function passes over every function body of a module.

use log::{debug, info};

use crate::ast::AstContext;
use crate::middle::ir::{Function, SilModule};
use crate::middle::simplify_cfg::{SimplifyCfg, SimplifyCfgOptions, SimplifyCfgStats};

/// A transformation of one function body
pub trait FunctionPass {
    /// Name of the pass
    fn name(&self) -> &'static str;

    /// Run the pass on a function. Returns whether the body changed.
    fn run_on_function(&mut self, func: &mut Function, ast: &AstContext) -> bool;

    /// Run the pass on every function of a module
    fn run_on_module(&mut self, module: &mut SilModule) -> bool {
        let (ast, functions) = module.split_mut();
        let mut changed = false;
        for func in functions.iter_mut() {
            if self.run_on_function(func, ast) {
                changed = true;
            }
        }
        changed
    }
}

impl FunctionPass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run_on_function(&mut self, func: &mut Function, ast: &AstContext) -> bool {
        self.run(func, ast)
    }
}

/// Runs its passes in order until none of them changes anything
pub struct PassManager {
    passes: Vec<Box<dyn FunctionPass>>,
    max_iterations: usize,
}

impl PassManager {
    /// An empty pipeline
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            max_iterations: 10,
        }
    }

    /// The default pipeline: simplify-cfg with the given options
    pub fn with_simplify_cfg(options: SimplifyCfgOptions) -> Self {
        let mut pm = Self::new();
        pm.add_pass(Box::new(SimplifyCfg::new(options)));
        pm
    }

    pub fn add_pass(&mut self, pass: Box<dyn FunctionPass>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run all passes on the module. Returns whether any pass changed it.
    pub fn run_module(&mut self, module: &mut SilModule) -> bool {
        let mut changed = false;
        let mut iteration = 0;

        loop {
            let mut round_changed = false;
            for pass in &mut self.passes {
                if pass.run_on_module(module) {
                    debug!("{} changed module '{}'", pass.name(), module.name);
                    round_changed = true;
                }
            }
            iteration += 1;
            changed |= round_changed;
            if !round_changed || iteration >= self.max_iterations {
                break;
            }
        }
        info!("pass pipeline finished after {} iteration(s)", iteration);
        changed
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::with_simplify_cfg(SimplifyCfgOptions::default())
    }
}

/// Simplify every function of a module, returning what the pass did
pub fn simplify_module(module: &mut SilModule, options: SimplifyCfgOptions) -> SimplifyCfgStats {
    let mut pass = SimplifyCfg::new(options);
    pass.run_on_module(module);
    pass.take_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_sil;

    const TWO_FUNCTIONS: &str = "sil @a : $@convention(thin) () -> () {
bb0:
  br bb1

bb1:
  %0 = tuple ()
  return %0 : $()
}

sil @b : $@convention(thin) () -> ()
";

    struct CountingPass {
        seen: usize,
    }

    impl FunctionPass for CountingPass {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run_on_function(&mut self, _func: &mut Function, _ast: &AstContext) -> bool {
            self.seen += 1;
            false
        }
    }

    #[test]
    fn test_pipeline_reaches_fixed_point() {
        let mut module = parse_sil(TWO_FUNCTIONS).unwrap();
        let mut pm = PassManager::default();
        assert_eq!(pm.pass_names(), vec!["simplify-cfg"]);
        assert!(pm.run_module(&mut module));
        assert!(!pm.run_module(&mut module));
        let a = module.function(module.find_function("a").unwrap());
        assert_eq!(a.block_count(), 1);
    }

    #[test]
    fn test_module_pass_visits_declarations_too() {
        let mut module = parse_sil(TWO_FUNCTIONS).unwrap();
        let mut pass = CountingPass { seen: 0 };
        assert!(!pass.run_on_module(&mut module));
        assert_eq!(pass.seen, 2);
    }

    #[test]
    fn test_simplify_module_reports_stats() {
        let mut module = parse_sil(TWO_FUNCTIONS).unwrap();
        let stats = simplify_module(&mut module, SimplifyCfgOptions::default());
        assert_eq!(stats.functions_changed, 1);
        assert_eq!(stats.blocks_merged, 1);
    }
}
